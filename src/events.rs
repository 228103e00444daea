//! Change events the upstream screen source reports to the demo server.
//!
//! This server never forwards input or clipboard state anywhere: viewers
//! are strictly read-only, and there is no upstream-facing counterpart to
//! the input messages a viewer can still technically send. Events flow in
//! exactly one direction, upstream to fan-out.

/// A change reported by the upstream screen source.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// A region of the framebuffer changed. Sessions add `rect` to their
    /// own pending dirty list rather than re-reading the whole
    /// framebuffer immediately.
    ImageChanged {
        /// X coordinate of the changed region.
        x: u16,
        /// Y coordinate of the changed region.
        y: u16,
        /// Width of the changed region.
        width: u16,
        /// Height of the changed region.
        height: u16,
    },

    /// The cursor image and/or hotspot changed.
    CursorShapeChanged {
        /// Cursor pixel data, row-major RGBA.
        image: std::sync::Arc<Vec<u8>>,
        /// Cursor width in pixels.
        width: u16,
        /// Cursor height in pixels.
        height: u16,
        /// Hotspot X offset within the cursor image.
        hotspot_x: u16,
        /// Hotspot Y offset within the cursor image.
        hotspot_y: u16,
    },

    /// The upstream source's framebuffer dimensions changed. Out of scope
    /// for viewers to react to beyond logging and disconnecting them, since
    /// `ServerInit` is only sent once per session.
    FramebufferResized {
        /// New framebuffer width.
        width: u16,
        /// New framebuffer height.
        height: u16,
    },

    /// The upstream connection was lost.
    Disconnected,
}
