//! The RLE+LZ pixel-rectangle codec.
//!
//! Two modes, chosen purely by pixel count (both sides derive the same
//! mode independently from the rectangle's width/height, so the mode
//! itself never needs to be carried on the wire):
//!
//! - **Small** (`width * height <= `[`RAW_MAX_PIXELS`]): a 12-byte
//!   zeroed header followed by raw 3-byte-per-pixel data. Not worth
//!   compressing; the header stays zeroed so a large-mode decoder path
//!   would trivially reject it (`bytes_rle == 0`) if ever misapplied.
//! - **Large**: pixel runs are collapsed into 4-byte RLE records (3-byte
//!   pixel value + 1-byte run-length-minus-one, capped at 255 pixels per
//!   run), then the whole RLE stream is always LZO1X-1 compressed,
//!   regardless of whether doing so shrinks it. A 12-byte big-endian
//!   header `{bytes_rle, bytes_lzo, compressed=1}` precedes the payload.
//!
//! Pixel values are 3 bytes on the wire, in network (big-endian) byte
//! order by default; [`crate::protocol::PixelFormat::has_opposite_endianness`]
//! determines whether a session byte-swaps each pixel before encoding.
//!
//! [`encode`] takes a caller-owned [`CodecBuffers`] rather than
//! allocating fresh `Vec`s on every call: a [`crate::session::ViewerSession`]
//! keeps one of these per connection and reuses it for every framebuffer
//! update it sends, matching the data model's "codec buffers are owned
//! exclusively by their session and never shared."

use crate::error::{DemoServerError, Result};

/// Pixel-count threshold below which a rectangle uses the raw small-mode
/// encoding instead of RLE+LZO.
pub const RAW_MAX_PIXELS: usize = 1024;

/// Length in bytes of the fixed header prefixing every encoded rectangle.
pub const HEADER_LEN: usize = 12;

/// Working-memory size required by the LZO1X-1 algorithm's reference
/// implementation (`LZO1X_1_MEM_COMPRESS`).
const LZO1X_1_MEM_COMPRESS: usize = 16 * 1024;

/// Per-viewer codec scratch buffers, reused across every framebuffer
/// update instead of allocating fresh `Vec`s per rectangle.
///
/// A [`crate::session::ViewerSession`] owns exactly one of these for its
/// whole lifetime; nothing outside the session ever touches it.
pub struct CodecBuffers {
    /// Reserved for the LZO1X-1 compressor's working-memory area, sized
    /// to the algorithm's well-known requirement. `minilzo-rs`'s
    /// `compress`/`decompress` functions allocate and manage their own
    /// working memory internally and don't currently accept a
    /// caller-supplied buffer, so this field isn't passed to them today;
    /// it's kept so this buffer set matches the data model's list and has
    /// an obvious home if the dependency (or a replacement) ever exposes
    /// that hook.
    #[allow(dead_code)]
    lzo_work_mem: Vec<u8>,
    /// Raw pixel scratch buffer, sized to [`RAW_MAX_PIXELS`] pixels.
    raw: Vec<u8>,
    /// RLE intermediate stream, grown on demand.
    rle: Vec<u8>,
    /// Final encoded rectangle (header + payload), grown on demand.
    out: Vec<u8>,
}

impl CodecBuffers {
    /// Allocates a fresh set of scratch buffers for one viewer session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lzo_work_mem: vec![0u8; LZO1X_1_MEM_COMPRESS],
            raw: Vec::with_capacity(RAW_MAX_PIXELS * 3),
            rle: Vec::new(),
            out: Vec::new(),
        }
    }
}

impl Default for CodecBuffers {
    fn default() -> Self {
        Self::new()
    }
}

fn pixel_to_bytes(pixel: u32, swap: bool) -> [u8; 3] {
    let r = ((pixel >> 16) & 0xFF) as u8;
    let g = ((pixel >> 8) & 0xFF) as u8;
    let b = (pixel & 0xFF) as u8;
    if swap {
        [b, g, r]
    } else {
        [r, g, b]
    }
}

fn bytes_to_pixel(bytes: [u8; 3], swap: bool) -> u32 {
    let (r, g, b) = if swap {
        (bytes[2], bytes[1], bytes[0])
    } else {
        (bytes[0], bytes[1], bytes[2])
    };
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// `true` if a rectangle with `pixel_count` pixels uses the small
/// raw-passthrough mode rather than RLE+LZO.
#[must_use]
pub fn is_small_mode(pixel_count: usize) -> bool {
    pixel_count <= RAW_MAX_PIXELS
}

/// Encodes `pixels` (in row-major order) for the wire, selecting small or
/// large mode based on `pixels.len()`, and returns a borrow of `buffers`'
/// own output buffer holding the encoded rectangle.
///
/// `buffers` is cleared and reused in place; nothing here allocates a new
/// `Vec` for the encoded rectangle itself on a cache hit (the `lzo_work_mem`
/// note on [`CodecBuffers`] explains the one exception, the compressor's
/// own internal allocation).
///
/// # Errors
///
/// Returns [`DemoServerError::Codec`] if LZO compression fails
/// unrecoverably.
pub fn encode<'a>(
    pixels: &[u32],
    swap_bytes: bool,
    buffers: &'a mut CodecBuffers,
) -> Result<&'a [u8]> {
    if is_small_mode(pixels.len()) {
        encode_small(pixels, swap_bytes, buffers);
    } else {
        encode_large(pixels, swap_bytes, buffers)?;
    }
    Ok(&buffers.out)
}

fn encode_small(pixels: &[u32], swap: bool, buffers: &mut CodecBuffers) {
    grow_buffer(&mut buffers.raw, pixels.len() * 3);
    buffers.raw.clear();
    for &p in pixels {
        buffers.raw.extend_from_slice(&pixel_to_bytes(p, swap));
    }

    grow_buffer(&mut buffers.out, HEADER_LEN + buffers.raw.len());
    buffers.out.clear();
    buffers.out.extend_from_slice(&[0u8; HEADER_LEN]);
    buffers.out.extend_from_slice(&buffers.raw);
}

fn build_rle(pixels: &[u32], swap: bool, buffers: &mut CodecBuffers) {
    grow_buffer(&mut buffers.rle, pixels.len() * 4);
    buffers.rle.clear();
    let mut i = 0;
    while i < pixels.len() {
        let current = pixels[i];
        let mut run = 1usize;
        while i + run < pixels.len() && pixels[i + run] == current && run < 255 {
            run += 1;
        }
        let bytes = pixel_to_bytes(current, swap);
        buffers.rle.extend_from_slice(&bytes);
        #[allow(clippy::cast_possible_truncation)]
        buffers.rle.push((run - 1) as u8);
        i += run;
    }
}

fn encode_large(pixels: &[u32], swap: bool, buffers: &mut CodecBuffers) -> Result<()> {
    build_rle(pixels, swap, buffers);

    let payload = minilzo::compress(&buffers.rle)
        .map_err(|e| DemoServerError::Codec(format!("lzo1x compression failed: {e:?}")))?;

    #[allow(clippy::cast_possible_truncation)]
    let bytes_rle = buffers.rle.len() as u32;
    #[allow(clippy::cast_possible_truncation)]
    let bytes_lzo = payload.len() as u32;

    grow_buffer(&mut buffers.out, HEADER_LEN + payload.len());
    buffers.out.clear();
    buffers.out.extend_from_slice(&bytes_rle.to_be_bytes());
    buffers.out.extend_from_slice(&bytes_lzo.to_be_bytes());
    buffers.out.extend_from_slice(&1u32.to_be_bytes()); // compressed: always set in large mode
    buffers.out.extend_from_slice(&payload);
    Ok(())
}

/// Decodes a rectangle previously produced by [`encode`]. `pixel_count`
/// must be the same `width * height` the encoder was called with, so both
/// sides agree on small vs. large mode.
///
/// This is the viewer-side half of the codec; this crate only ever plays
/// the server role, so `decode` isn't called from a hot loop and doesn't
/// need a reusable buffer set of its own.
///
/// # Errors
///
/// Returns [`DemoServerError::ShortRead`] if `data` is truncated, or
/// [`DemoServerError::Codec`] if LZO decompression fails.
pub fn decode(data: &[u8], pixel_count: usize, swap_bytes: bool) -> Result<Vec<u32>> {
    if data.len() < HEADER_LEN {
        return Err(DemoServerError::ShortRead {
            expected: HEADER_LEN,
            got: data.len(),
        });
    }

    if is_small_mode(pixel_count) {
        decode_small(&data[HEADER_LEN..], pixel_count, swap_bytes)
    } else {
        decode_large(data, swap_bytes)
    }
}

fn decode_small(payload: &[u8], pixel_count: usize, swap: bool) -> Result<Vec<u32>> {
    let needed = pixel_count * 3;
    if payload.len() < needed {
        return Err(DemoServerError::ShortRead {
            expected: needed,
            got: payload.len(),
        });
    }
    let mut out = Vec::with_capacity(pixel_count);
    for chunk in payload[..needed].chunks_exact(3) {
        out.push(bytes_to_pixel([chunk[0], chunk[1], chunk[2]], swap));
    }
    Ok(out)
}

fn decode_large(data: &[u8], swap: bool) -> Result<Vec<u32>> {
    let bytes_rle = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let _bytes_lzo = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let compressed = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) != 0;
    let payload = &data[HEADER_LEN..];

    let rle = if compressed {
        minilzo::decompress(payload, bytes_rle)
            .map_err(|e| DemoServerError::Codec(format!("lzo1x decompression failed: {e:?}")))?
    } else {
        payload.to_vec()
    };

    let mut out = Vec::with_capacity(rle.len() / 4 * 4);
    for record in rle.chunks_exact(4) {
        let pixel = bytes_to_pixel([record[0], record[1], record[2]], swap);
        let run = usize::from(record[3]) + 1;
        out.resize(out.len() + run, pixel);
    }
    Ok(out)
}

/// Grows `buf`'s capacity to at least `min_capacity`, doubling rather than
/// reallocating to the exact size each time, and never shrinking an
/// already-larger buffer. Used to grow a per-session scratch buffer reused
/// across many framebuffer updates.
pub fn grow_buffer(buf: &mut Vec<u8>, min_capacity: usize) {
    if buf.capacity() >= min_capacity {
        return;
    }
    let mut target = buf.capacity().max(HEADER_LEN);
    while target < min_capacity {
        target *= 2;
    }
    buf.reserve(target - buf.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(pixel: u32, count: usize) -> Vec<u32> {
        vec![pixel; count]
    }

    #[test]
    fn small_mode_threshold() {
        assert!(is_small_mode(RAW_MAX_PIXELS));
        assert!(!is_small_mode(RAW_MAX_PIXELS + 1));
    }

    #[test]
    fn small_rect_round_trips() {
        let pixels: Vec<u32> = (0..64).map(|i| 0x0010_2030 + i).collect();
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, false, &mut buffers).unwrap().to_vec();
        assert_eq!(&encoded[..HEADER_LEN], &[0u8; HEADER_LEN]);
        let decoded = decode(&encoded, pixels.len(), false).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn small_rect_round_trips_with_byte_swap() {
        let pixels: Vec<u32> = (0..16).map(|i| 0x00AA_BB00 + i).collect();
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, true, &mut buffers).unwrap().to_vec();
        let decoded = decode(&encoded, pixels.len(), true).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn large_solid_rect_compresses_and_round_trips() {
        let pixels = solid(0x00_33_66_99, 4096);
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, false, &mut buffers).unwrap().to_vec();
        assert!(encoded.len() < pixels.len() * 3);
        let decoded = decode(&encoded, pixels.len(), false).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn large_noisy_rect_round_trips_even_if_incompressible() {
        let pixels: Vec<u32> = (0..4096u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, false, &mut buffers).unwrap().to_vec();
        let decoded = decode(&encoded, pixels.len(), false).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn large_mode_always_sets_compressed_flag() {
        // Even pathologically incompressible input must carry
        // `compressed=1`: large mode never falls back to a raw payload.
        let pixels: Vec<u32> = (0..4096u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, false, &mut buffers).unwrap();
        let compressed = u32::from_be_bytes([encoded[8], encoded[9], encoded[10], encoded[11]]);
        assert_eq!(compressed, 1);
    }

    #[test]
    fn run_longer_than_255_splits_into_multiple_records() {
        let pixels = solid(0x00_10_20_30, 600);
        let mut buffers = CodecBuffers::new();
        let encoded = encode(&pixels, false, &mut buffers).unwrap().to_vec();
        let decoded = decode(&encoded, pixels.len(), false).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn reused_buffers_produce_the_same_output_as_a_fresh_set() {
        // A session keeps one `CodecBuffers` for its whole lifetime; back
        // to back encodes of different rectangles must not leak state
        // from one call into the next (stale bytes left over from a
        // bigger previous rectangle, a stale length, ...).
        let small = solid(0x00_11_22_33, 16);
        let large = solid(0x00_44_55_66, 4096);

        let mut buffers = CodecBuffers::new();
        let first = encode(&large, false, &mut buffers).unwrap().to_vec();
        let second = encode(&small, false, &mut buffers).unwrap().to_vec();

        let mut fresh_buffers = CodecBuffers::new();
        let expected_second = encode(&small, false, &mut fresh_buffers).unwrap().to_vec();
        assert_eq!(second, expected_second);

        let decoded_first = decode(&first, large.len(), false).unwrap();
        assert_eq!(decoded_first, large);
    }

    #[test]
    fn grow_buffer_never_shrinks() {
        let mut buf = Vec::with_capacity(128);
        grow_buffer(&mut buf, 64);
        assert!(buf.capacity() >= 128);
        grow_buffer(&mut buf, 1000);
        assert!(buf.capacity() >= 1000);
    }
}
