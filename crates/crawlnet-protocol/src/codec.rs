//! Codec trait and the default JSON implementation.
//!
//! A codec turns the plaintext [`Wire`](crate::packet) frame into bytes and
//! back. Password sealing happens one layer up, in
//! [`PacketFactory`](crate::PacketFactory), so codecs never see ciphertext.

use serde::{Serialize, de::DeserializeOwned};

use crate::PacketError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` so a factory holding a codec can live inside an
/// engine that is moved across threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`PacketError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, PacketError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`PacketError::Decode`] if the bytes are malformed or don't
    /// describe a `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, PacketError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Frames stay readable in packet captures and logs, which matters more
/// than size at four players.
///
/// ```rust
/// use crawlnet_protocol::{Codec, JsonCodec, Turn};
///
/// let codec = JsonCodec;
/// let turn = Turn { seq: 1, data: vec![1, 2, 3] };
/// let bytes = codec.encode(&turn).unwrap();
/// let decoded: Turn = codec.decode(&bytes).unwrap();
/// assert_eq!(turn, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, PacketError> {
        serde_json::to_vec(value).map_err(PacketError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, PacketError> {
        serde_json::from_slice(data).map_err(PacketError::Decode)
    }
}
