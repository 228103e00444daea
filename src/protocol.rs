// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Remote Framebuffer (RFB) protocol constants and wire structures for the
//! demo broadcast server's handshake variant.
//!
//! Unlike a general-purpose RFB server, this protocol offers exactly one
//! security type (a vendor-specific "Veyon" type, itself negotiating a
//! single token auth type) and exactly one pixel-rectangle encoding, plus
//! one pseudo-encoding for cursor shape. There is no encoding negotiation:
//! the server always uses its own RLE+LZ encoding regardless of what the
//! viewer's `SetEncodings` message lists.
//!
//! # Protocol overview
//!
//! 1. **Protocol version** - fixed 12-byte string exchange, no negotiation.
//! 2. **Security handshake** - server offers only [`SECURITY_TYPE_VEYON`];
//!    auth proceeds as a variant-message exchange ending in a single token.
//! 3. **Initialization** - `ClientInit`/`ServerInit` exchange, framebuffer
//!    dimensions and the server's normalized pixel format.
//! 4. **Running** - update requests in, framebuffer-update rectangles out.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// The RFB protocol version string the server advertises.
///
/// The version exchange carries no real negotiation in this protocol: the
/// viewer's reply bytes are read and discarded once the 12-byte record is
/// complete.
pub const PROTOCOL_VERSION: &str = "RFB 003.008\n";

/// Length in bytes of the protocol-version handshake record, in either
/// direction.
pub const PROTOCOL_VERSION_LEN: usize = 12;

// Security types

/// The only security type this server offers: a vendor-specific scheme
/// that authenticates with a single shared token carried in a
/// variant-array message, rather than the standard VNC DES challenge.
///
/// The numeric value is this crate's own choice, documented as an
/// assumption in `DESIGN.md`: the retrieved reference source does not
/// include the header that defines the real wire value.
pub const SECURITY_TYPE_VEYON: u8 = 30;

// Auth types, carried as a variant value once the Veyon security type has
// been selected.

/// The only auth type this server offers: a single shared-secret token.
pub const AUTH_TYPE_TOKEN: u32 = 1;

// Security result (written as a 4-byte big-endian value after auth)

/// Security result: authentication succeeded.
pub const SECURITY_RESULT_OK: u32 = 0;

/// Security result: authentication failed.
pub const SECURITY_RESULT_FAILED: u32 = 1;

// Client-to-server message types (wire values identical to mainline RFB)

/// Client requests to change the pixel format it wants updates encoded in.
/// This server only reacts to the endianness bit of this message; every
/// other field is accepted and otherwise ignored.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Client declares the list of encodings it supports. Always ignored: the
/// server unconditionally uses its own RLE+LZ encoding.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Client requests a framebuffer update, incremental or full.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Client sends clipboard (cut text) data. Read off the wire and dropped;
/// this server never forwards input or clipboard state upstream.
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

/// Client sends a key event. Not in this server's supported-message set
/// (§4.4): a viewer that sends one is treated as a protocol violation,
/// since this server never accepts input. Kept for reference against the
/// standard RFB message-type numbering this crate's constants otherwise
/// follow.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Client sends a pointer event. Not in this server's supported-message
/// set (§4.4); see [`CLIENT_MSG_KEY_EVENT`].
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

// Server-to-client message types

/// Server sends a framebuffer update.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

// Encodings

/// This server's custom pixel-rectangle encoding: run-length coalesced
/// 24-bit pixel runs, optionally LZO1X-1 compressed, behind a small
/// fixed header. See [`crate::codec`] for the wire format.
///
/// The numeric value is this crate's own choice (documented in
/// `DESIGN.md`); it is not derived from a published vendor header.
pub const ENCODING_RLE_LZ: i32 = 0x4C5A_4F31; // ASCII "LZO1"

/// Pseudo-encoding used for the cursor-shape rectangle: its "pixel data"
/// is actually a variant-array message carrying the cursor image and
/// hotspot, not raw pixels.
pub const ENCODING_VEYON_CURSOR: i32 = 0x5645_5943; // ASCII "VEYC"

/// Represents the 16-byte RFB pixel-format record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel.
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// `1` if pixel data is big-endian, `0` if little-endian.
    pub big_endian_flag: u8,
    /// `1` if true-colour, `0` if colour-mapped.
    pub true_colour_flag: u8,
    /// Maximum red component value.
    pub red_max: u16,
    /// Maximum green component value.
    pub green_max: u16,
    /// Maximum blue component value.
    pub blue_max: u16,
    /// Bit shift to reach the red component.
    pub red_shift: u8,
    /// Bit shift to reach the green component.
    pub green_shift: u8,
    /// Bit shift to reach the blue component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The pixel format this server always advertises, regardless of the
    /// upstream source's native format: 32bpp true-colour, R/G/B max 255,
    /// shifts R=16 G=8 B=0 (matching the `0x00RRGGBB` layout
    /// [`crate::framebuffer::Framebuffer`] stores pixels in), host-native
    /// byte order.
    #[must_use]
    pub fn demo_normalized() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: u8::from(cfg!(target_endian = "big")),
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// `true` if `other` declares the opposite byte order from this
    /// format. This is the only field of a viewer-declared
    /// `SetPixelFormat` this server reacts to: everything else about the
    /// advertised format is fixed.
    #[must_use]
    pub fn has_opposite_endianness(&self, other: &PixelFormat) -> bool {
        self.big_endian_flag != other.big_endian_flag
    }

    /// Serializes the pixel format into its 16-byte RFB wire record.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Parses a 16-byte RFB pixel-format record.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 16 bytes are available.
    pub fn from_bytes(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 16 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for PixelFormat",
            ));
        }

        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian_flag: buf.get_u8(),
            true_colour_flag: buf.get_u8(),
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3); // padding
        Ok(pf)
    }
}

/// The fixed desktop name this server advertises. The protocol this crate
/// implements hardcodes it rather than taking it from configuration.
pub const DESKTOP_NAME: &str = "DEMO";

/// Represents the `ServerInit` message sent once, immediately after
/// authentication succeeds.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// Framebuffer width in pixels.
    pub framebuffer_width: u16,
    /// Framebuffer height in pixels.
    pub framebuffer_height: u16,
    /// The (always normalized) pixel format.
    pub pixel_format: PixelFormat,
}

impl ServerInit {
    /// Serializes the full `ServerInit` message, including the fixed
    /// [`DESKTOP_NAME`] trailer.
    ///
    /// Wire layout: 2 bytes width, 2 bytes height, 16-byte pixel format,
    /// 4-byte name length, name bytes.
    #[allow(clippy::cast_possible_truncation)] // DESKTOP_NAME is a short constant
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.framebuffer_width);
        buf.put_u16(self.framebuffer_height);
        self.pixel_format.write_to(buf);

        let name_bytes = DESKTOP_NAME.as_bytes();
        buf.put_u32(name_bytes.len() as u32);
        buf.put_slice(name_bytes);
    }
}

/// A rectangle header within a framebuffer-update message.
#[derive(Debug, Clone, Copy)]
pub struct RectHeader {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Encoding identifier for the data that follows.
    pub encoding: i32,
}

impl RectHeader {
    /// Serializes the 12-byte rectangle header.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_i32(self.encoding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_format_matches_data_model_shifts() {
        let pf = PixelFormat::demo_normalized();
        assert_eq!(pf.bits_per_pixel, 32);
        assert_eq!(pf.red_max, 255);
        assert_eq!(pf.green_max, 255);
        assert_eq!(pf.blue_max, 255);
        assert_eq!(pf.red_shift, 16);
        assert_eq!(pf.green_shift, 8);
        assert_eq!(pf.blue_shift, 0);
    }

    #[test]
    fn pixel_format_round_trips_through_wire_bytes() {
        let pf = PixelFormat::demo_normalized();
        let mut buf = BytesMut::new();
        pf.write_to(&mut buf);
        assert_eq!(buf.len(), 16);
        let parsed = PixelFormat::from_bytes(&mut buf).unwrap();
        assert_eq!(parsed, pf);
        assert!(buf.is_empty());
    }

    #[test]
    fn opposite_endianness_detected() {
        let server = PixelFormat::demo_normalized();
        let mut viewer = server.clone();
        viewer.big_endian_flag = 1 - server.big_endian_flag;
        assert!(server.has_opposite_endianness(&viewer));
        assert!(!server.has_opposite_endianness(&server.clone()));
    }

    #[test]
    fn server_init_wire_layout() {
        let init = ServerInit {
            framebuffer_width: 1920,
            framebuffer_height: 1080,
            pixel_format: PixelFormat::demo_normalized(),
        };
        let mut buf = BytesMut::new();
        init.write_to(&mut buf);
        // 2 + 2 + 16 + 4 + len("DEMO")
        assert_eq!(buf.len(), 2 + 2 + 16 + 4 + DESKTOP_NAME.len());
    }
}
