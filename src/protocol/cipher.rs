//! XOR obfuscation and random alphanumeric material
//!
//! The obfuscation key is a 32-byte pad derived once per process from the
//! shared passphrase. Applying the pad twice restores the input.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Width of the derived obfuscation key in bytes
pub const KEY_LEN: usize = 32;

/// Key used when no passphrase is configured
pub const FALLBACK_KEY: &[u8; KEY_LEN] = b"SpUsXuZw4z6B9EbGdKgNjQnTqVsYv2x5";

/// Cyclic XOR pad
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct XorCipher {
    key: [u8; KEY_LEN],
}

impl XorCipher {
    /// Use the given key bytes as the pad
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        XorCipher { key }
    }

    /// Derive the pad from a passphrase
    ///
    /// The pad is the first 32 characters of the lowercase hex SHA-256 of
    /// the passphrase. An empty passphrase selects [`FALLBACK_KEY`].
    ///
    /// # Example
    ///
    /// ```
    /// use veilsocks::protocol::XorCipher;
    ///
    /// let cipher = XorCipher::from_passphrase("secret");
    /// let mut data = *b"hello";
    /// cipher.apply(&mut data);
    /// cipher.apply(&mut data);
    /// assert_eq!(&data, b"hello");
    /// ```
    pub fn from_passphrase(passphrase: &str) -> Self {
        if passphrase.is_empty() {
            return XorCipher::new(*FALLBACK_KEY);
        }
        let digest = Sha256::new().chain_update(passphrase.as_bytes()).finalize();
        let encoded = hex::encode(digest);
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&encoded.as_bytes()[..KEY_LEN]);
        XorCipher::new(key)
    }

    /// XOR the pad over `buf` in place
    pub fn apply(&self, buf: &mut [u8]) {
        for (b, k) in buf.iter_mut().zip(self.key.iter().cycle()) {
            *b ^= k;
        }
    }

    /// The raw pad bytes
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for XorCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XorCipher").finish_non_exhaustive()
    }
}

/// Random nonce of 8 to 263 alphanumeric characters
pub fn random_nonce() -> String {
    let mut rng = rand::thread_rng();
    let len = 8 + rng.gen_range(0..256);
    Alphanumeric.sample_string(&mut rng, len)
}

/// `len` bytes of alphanumeric filler
pub fn random_filler(len: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .collect()
}
