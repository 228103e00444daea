//! The in-memory framebuffer image shared by every viewer session.
//!
//! Pixels are stored as `u32` in `0x00RRGGBB` host-byte-order layout,
//! matching the server's normalized [`crate::protocol::PixelFormat`]
//! shifts directly: no translation is needed between storage and wire
//! layout, only an optional byte-swap for a viewer that declared the
//! opposite endianness.

use std::sync::Arc;
use tokio::sync::RwLock;

/// A fixed-size framebuffer image.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    pixels: Vec<u32>,
}

impl Framebuffer {
    /// Creates a framebuffer of the given dimensions, initialized to
    /// black.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; usize::from(width) * usize::from(height)],
        }
    }

    /// Framebuffer width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Framebuffer height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// All pixels, in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Copies out the pixels within `x, y, width, height`, row by row.
    ///
    /// Returns an empty vector if the requested rectangle falls outside
    /// the framebuffer bounds.
    #[must_use]
    pub fn copy_rect(&self, x: u16, y: u16, width: u16, height: u16) -> Vec<u32> {
        if width == 0
            || height == 0
            || x >= self.width
            || y >= self.height
            || x + width > self.width
            || y + height > self.height
        {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(usize::from(width) * usize::from(height));
        for row in y..y + height {
            let start = usize::from(row) * usize::from(self.width) + usize::from(x);
            out.extend_from_slice(&self.pixels[start..start + usize::from(width)]);
        }
        out
    }

    /// Replaces the pixels within `x, y, width, height` with `data`
    /// (row-major, `width * height` pixels).
    ///
    /// Silently clips to the framebuffer bounds if the caller passes a
    /// rectangle that doesn't fit; this only happens if the upstream
    /// source reports a rectangle inconsistent with its own declared
    /// dimensions, and losing those pixels is preferable to panicking a
    /// session task.
    pub fn write_rect(&mut self, x: u16, y: u16, width: u16, height: u16, data: &[u32]) {
        if width == 0 || height == 0 || x >= self.width || y >= self.height {
            return;
        }
        let clipped_width = width.min(self.width - x);
        let clipped_height = height.min(self.height - y);

        for row in 0..clipped_height {
            let src_start = usize::from(row) * usize::from(width);
            let dst_row = y + row;
            let dst_start = usize::from(dst_row) * usize::from(self.width) + usize::from(x);
            let count = usize::from(clipped_width);
            self.pixels[dst_start..dst_start + count]
                .copy_from_slice(&data[src_start..src_start + count]);
        }
    }
}

/// A framebuffer shared between the upstream adapter and every viewer
/// session, guarded by a single async read-write lock.
///
/// Sessions take a read lock only for the short duration of copying the
/// pixels they're about to encode; the upstream adapter takes the write
/// lock only to apply one incoming rectangle at a time. Never held across
/// an `.await` on network I/O.
pub type SharedFramebuffer = Arc<RwLock<Framebuffer>>;

/// Wraps a framebuffer for sharing across tasks.
#[must_use]
pub fn shared(fb: Framebuffer) -> SharedFramebuffer {
    Arc::new(RwLock::new(fb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_framebuffer_is_black() {
        let fb = Framebuffer::new(4, 4);
        assert!(fb.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn write_then_copy_round_trips() {
        let mut fb = Framebuffer::new(8, 8);
        let patch: Vec<u32> = (0..9).map(|i| 0x0010_0000 + i).collect();
        fb.write_rect(2, 2, 3, 3, &patch);
        let copied = fb.copy_rect(2, 2, 3, 3);
        assert_eq!(copied, patch);
    }

    #[test]
    fn copy_rect_out_of_bounds_is_empty() {
        let fb = Framebuffer::new(4, 4);
        assert!(fb.copy_rect(10, 10, 2, 2).is_empty());
        assert!(fb.copy_rect(3, 3, 4, 4).is_empty());
    }

    #[test]
    fn write_rect_clips_instead_of_panicking() {
        let mut fb = Framebuffer::new(4, 4);
        let patch = vec![0x00FF_FFFF; 16];
        fb.write_rect(2, 2, 4, 4, &patch);
        assert_eq!(fb.copy_rect(2, 2, 2, 2), vec![0x00FF_FFFF; 4]);
    }
}
