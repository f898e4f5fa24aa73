//! Wire framing
//!
//! Two frame layouts share the little-endian `i32` length convention:
//!
//! ```text
//! plain:  | len: i32 LE | payload |
//! padded: | total: i32 LE | len: i32 LE | payload | filler |
//! ```
//!
//! The decoders are incremental: they hold whatever bytes have arrived so far
//! and yield `Ok(None)` until a whole frame is buffered, so a frame is never
//! half-consumed. Filler bytes of a padded frame are dropped before the
//! payload reaches the caller.

use super::cipher::random_filler;
use crate::error::VeilError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the plain frame header
pub const PLAIN_HEADER_LEN: usize = 4;

/// Size of the padded frame header
pub const PADDED_HEADER_LEN: usize = 8;

/// Payloads shorter than this are padded into the band
pub const PADDING_FLOOR: usize = 1000;

/// Exclusive upper bound of a padded frame's total length
pub const PADDING_CEIL: usize = 1500;

/// Declared lengths above this are treated as malformed
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Encode `payload` as a plain frame
pub fn encode(payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(PLAIN_HEADER_LEN + payload.len());
    dst.put_i32_le(payload.len() as i32);
    dst.put_slice(payload);
    dst.freeze()
}

/// Number of filler bytes for a payload of `len` bytes
///
/// The draw is two-staged: a span is picked first, then a length inside the
/// span above the floor. The result keeps `len + filler` within
/// `[PADDING_FLOOR, PADDING_CEIL)` but is not uniform over that band.
pub fn padding_len(len: usize) -> usize {
    if len >= PADDING_FLOOR {
        return 0;
    }
    let min = PADDING_FLOOR - len;
    let max = PADDING_CEIL - len;
    let mut rng = rand::thread_rng();
    let span = rng.gen_range(1..=max - min);
    min + rng.gen_range(0..span)
}

/// Encode `payload` as a padded frame
///
/// Fails on an empty payload.
pub fn padding_encode(payload: &[u8]) -> Result<Bytes, VeilError> {
    if payload.is_empty() {
        return Err(VeilError::Codec("cannot pad an empty payload".to_string()));
    }
    let filler = padding_len(payload.len());
    let total = payload.len() + filler;

    let mut dst = BytesMut::with_capacity(PADDED_HEADER_LEN + total);
    dst.put_i32_le(total as i32);
    dst.put_i32_le(payload.len() as i32);
    dst.put_slice(payload);
    dst.put_slice(&random_filler(filler));
    Ok(dst.freeze())
}

fn peek_len(src: &[u8], at: usize) -> Result<usize, VeilError> {
    let raw = i32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]);
    if raw < 0 || raw as usize > MAX_FRAME_LEN {
        return Err(VeilError::Codec(format!("invalid frame length {}", raw)));
    }
    Ok(raw as usize)
}

/// Incremental decoder and encoder for plain frames
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl Decoder for PlainCodec {
    type Item = BytesMut;
    type Error = VeilError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PLAIN_HEADER_LEN {
            return Ok(None);
        }
        let len = peek_len(src, 0)?;
        if src.len() < PLAIN_HEADER_LEN + len {
            src.reserve(PLAIN_HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(PLAIN_HEADER_LEN);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<&[u8]> for PlainCodec {
    type Error = VeilError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(PLAIN_HEADER_LEN + item.len());
        dst.put_i32_le(item.len() as i32);
        dst.put_slice(item);
        Ok(())
    }
}

/// Incremental decoder and encoder for padded frames
#[derive(Debug, Default, Clone, Copy)]
pub struct PaddingCodec;

impl Decoder for PaddingCodec {
    type Item = BytesMut;
    type Error = VeilError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PLAIN_HEADER_LEN {
            return Ok(None);
        }
        let total = peek_len(src, 0)?;
        if total == 0 {
            return Err(VeilError::Codec("padded frame is empty".to_string()));
        }
        if src.len() < PADDED_HEADER_LEN + total {
            src.reserve(PADDED_HEADER_LEN + total - src.len());
            return Ok(None);
        }
        let len = peek_len(src, PLAIN_HEADER_LEN)?;
        if len > total {
            return Err(VeilError::Codec(format!(
                "payload length {} exceeds frame length {}",
                len, total
            )));
        }
        let mut frame = src.split_to(PADDED_HEADER_LEN + total);
        frame.advance(PADDED_HEADER_LEN);
        frame.truncate(len);
        Ok(Some(frame))
    }
}

impl Encoder<&[u8]> for PaddingCodec {
    type Error = VeilError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&padding_encode(item)?);
        Ok(())
    }
}
