//! Per-direction payload transforms
//!
//! Outbound chunks are obfuscated, compressed, then padded. The return path
//! undoes compression and obfuscation after the frame reader has stripped any
//! padding.

use super::cipher::XorCipher;
use super::frame::padding_encode;
use crate::error::Result;
use bytes::Bytes;
use std::borrow::Cow;

/// Ordered transform settings shared by both relay directions
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    /// XOR pad, when obfuscation is enabled
    pub cipher: Option<XorCipher>,
    /// Snappy block compression
    pub compress: bool,
    /// Padded framing
    pub padding: bool,
}

impl Pipeline {
    /// Transform one chunk read from the client into wire bytes
    ///
    /// `chunk` is obfuscated in place.
    pub fn seal(&self, chunk: &mut [u8]) -> Result<Bytes> {
        if let Some(cipher) = &self.cipher {
            cipher.apply(chunk);
        }
        let body: Cow<'_, [u8]> = if self.compress {
            Cow::Owned(snap::raw::Encoder::new().compress_vec(chunk)?)
        } else {
            Cow::Borrowed(chunk)
        };
        if self.padding {
            padding_encode(&body)
        } else {
            Ok(Bytes::copy_from_slice(&body))
        }
    }

    /// Recover client bytes from one unpadded chunk read from the stream
    pub fn open<'a>(&self, chunk: &'a mut [u8]) -> Result<Cow<'a, [u8]>> {
        if self.compress {
            let mut data = snap::raw::Decoder::new().decompress_vec(chunk)?;
            if let Some(cipher) = &self.cipher {
                cipher.apply(&mut data);
            }
            return Ok(Cow::Owned(data));
        }
        if let Some(cipher) = &self.cipher {
            cipher.apply(chunk);
        }
        Ok(Cow::Borrowed(chunk))
    }
}
