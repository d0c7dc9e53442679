//! Error types for the packet codec.
//!
//! Every variant here means "this buffer is not a packet we accept". The
//! engine never forwards such a buffer; it drops it and disconnects the
//! sender.

/// Errors that can occur while building or parsing packets.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// Serialization failed (turning a packet into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed frame, unknown packet type, or a
    /// player field outside `0..MAX_PLRS`.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Sealing the frame with the game password failed.
    #[error("encryption failed")]
    Encryption,

    /// The frame did not authenticate: wrong password or tampered bytes.
    #[error("decryption failed (wrong password or corrupted packet)")]
    Decryption,

    /// The buffer is too short to contain a frame.
    #[error("packet truncated: {0} bytes")]
    Truncated(usize),

    /// An `INFO_REPLY` payload that does not follow the announcement layout.
    #[error("malformed game announcement: {0}")]
    MalformedInfo(String),
}
