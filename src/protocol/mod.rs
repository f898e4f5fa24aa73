//! Wire protocol module for Veilsocks
//!
//! Framing, the handshake record, the obfuscation pad and the ordered payload
//! transforms applied by the relays.

mod cipher;
mod frame;
mod pipeline;
mod request;

pub use cipher::{random_filler, random_nonce, XorCipher, FALLBACK_KEY, KEY_LEN};
pub use frame::{
    encode, padding_encode, padding_len, PaddingCodec, PlainCodec, MAX_FRAME_LEN,
    PADDED_HEADER_LEN, PADDING_CEIL, PADDING_FLOOR, PLAIN_HEADER_LEN,
};
pub use pipeline::Pipeline;
pub use request::{handshake, Network, ProxyRequest};
