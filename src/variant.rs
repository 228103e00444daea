//! Self-describing variant-array messages.
//!
//! The Veyon-derived auth negotiation and the cursor-shape pseudo-encoding
//! both exchange small, heterogeneous tuples of values rather than a fixed
//! binary record. Each [`Variant`] carries its own type tag on the wire so
//! a reader never needs to know the shape in advance; a [`VariantArray`] is
//! simply a length-prefixed sequence of them.
//!
//! Wire format of one variant: 1-byte tag, then the payload.
//! - `UInt32`: 4-byte big-endian value.
//! - `Str`: 4-byte big-endian byte length, then UTF-8 bytes.
//! - `ByteArray`: 4-byte big-endian byte length, then raw bytes.
//!
//! Wire format of a [`VariantArray`]: 4-byte big-endian element count, then
//! that many variants back to back.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// A single self-describing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// An unsigned 32-bit integer.
    UInt32(u32),
    /// A UTF-8 string.
    Str(String),
    /// An opaque byte blob (e.g. cursor pixel data).
    ByteArray(Vec<u8>),
}

const TAG_UINT32: u8 = 0;
const TAG_STR: u8 = 1;
const TAG_BYTE_ARRAY: u8 = 2;

impl Variant {
    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Variant::UInt32(v) => {
                buf.put_u8(TAG_UINT32);
                buf.put_u32(*v);
            }
            Variant::Str(s) => {
                buf.put_u8(TAG_STR);
                let bytes = s.as_bytes();
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            Variant::ByteArray(b) => {
                buf.put_u8(TAG_BYTE_ARRAY);
                #[allow(clippy::cast_possible_truncation)]
                buf.put_u32(b.len() as u32);
                buf.put_slice(b);
            }
        }
    }

    fn read_from(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.remaining() < 1 {
            return Err(short("variant tag"));
        }
        let tag = buf.get_u8();
        match tag {
            TAG_UINT32 => {
                if buf.remaining() < 4 {
                    return Err(short("variant u32 payload"));
                }
                Ok(Variant::UInt32(buf.get_u32()))
            }
            TAG_STR => {
                let bytes = read_length_prefixed(buf, "variant string payload")?;
                let s = String::from_utf8(bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Variant::Str(s))
            }
            TAG_BYTE_ARRAY => {
                let bytes = read_length_prefixed(buf, "variant byte-array payload")?;
                Ok(Variant::ByteArray(bytes))
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown variant tag {other}"),
            )),
        }
    }
}

fn read_length_prefixed(buf: &mut BytesMut, what: &'static str) -> io::Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(short(what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(short(what));
    }
    Ok(buf.split_to(len).to_vec())
}

fn short(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("short read: {what}"))
}

/// An ordered sequence of [`Variant`] values exchanged as one logical
/// message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantArray {
    /// The variants carried by this message, in wire order.
    pub values: Vec<Variant>,
}

impl VariantArray {
    /// Builds an array from an owned vector of variants.
    #[must_use]
    pub fn new(values: Vec<Variant>) -> Self {
        Self { values }
    }

    /// Serializes this array to its wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(self.values.len() as u32);
        for v in &self.values {
            v.write_to(buf);
        }
    }

    /// Parses a variant array out of `buf`, consuming exactly the bytes it
    /// occupies.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is truncated or contains an unknown
    /// variant tag.
    pub fn read_from(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.remaining() < 4 {
            return Err(short("variant array count"));
        }
        let count = buf.get_u32() as usize;
        let mut values = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            values.push(Variant::read_from(buf)?);
        }
        Ok(Self { values })
    }

    /// Convenience constructor for the server's list of offered auth
    /// types, sent as a single-element array naming
    /// [`crate::protocol::AUTH_TYPE_TOKEN`].
    #[must_use]
    pub fn auth_types(types: &[u32]) -> Self {
        Self::new(types.iter().copied().map(Variant::UInt32).collect())
    }

    /// Convenience constructor for a viewer's token response.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::new(vec![Variant::Str(token.into())])
    }

    /// Reads the single string value out of a token-shaped array.
    ///
    /// # Errors
    ///
    /// Returns an error if the array does not contain exactly one string
    /// variant.
    pub fn as_token(&self) -> io::Result<&str> {
        match self.values.as_slice() {
            [Variant::Str(s)] => Ok(s.as_str()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "expected a single-string token variant array",
            )),
        }
    }
}
