//! Building and parsing packets, optionally sealed with the game password.
//!
//! Without a password a frame is the codec's encoding of
//! `{src, dst, body}`. With one, the same bytes are sealed with
//! ChaCha20-Poly1305:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────────┐
//! │ nonce (12 B) │ ciphertext                   │ tag (16 B)  │
//! └──────────────┴──────────────────────────────┴─────────────┘
//! ```
//!
//! The key is SHA-256 over a fixed domain prefix and the password, so every
//! participant who typed the same password derives the same key.

use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use sha2::{Digest, Sha256};

use crate::packet::Wire;
use crate::{Address, Codec, JsonCodec, Packet, PacketBody, PacketError};

/// Nonce length prepended to every sealed frame.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag length.
pub const TAG_SIZE: usize = 16;

const KEY_DOMAIN: &[u8] = b"crawlnet/v1/game-password";

/// Creates [`Packet`]s and parses received frames.
///
/// One factory per engine. Changing the password affects every packet made
/// or parsed afterwards; packets already built keep their frames.
#[derive(Clone, Default)]
pub struct PacketFactory<C: Codec = JsonCodec> {
    codec: C,
    cipher: Option<ChaCha20Poly1305>,
}

impl PacketFactory {
    /// Creates a factory with the JSON codec and no password.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Codec> PacketFactory<C> {
    /// Seals every subsequent frame with a key derived from `password`.
    pub fn set_password(&mut self, password: &str) {
        let key = Sha256::new()
            .chain_update(KEY_DOMAIN)
            .chain_update(password.as_bytes())
            .finalize();
        self.cipher = Some(ChaCha20Poly1305::new(&key));
    }

    /// Goes back to plaintext frames.
    pub fn clear_password(&mut self) {
        self.cipher = None;
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Builds a packet and its frame.
    ///
    /// # Errors
    /// Returns [`PacketError::Encode`] or [`PacketError::Encryption`].
    pub fn make_packet(
        &self,
        source: impl Into<Address>,
        destination: impl Into<Address>,
        body: PacketBody,
    ) -> Result<Packet, PacketError> {
        let source = source.into();
        let destination = destination.into();
        let plain = self.codec.encode(&Wire {
            src: source,
            dst: destination,
            body: &body,
        })?;
        let data = match &self.cipher {
            Some(cipher) => seal(cipher, &plain)?,
            None => plain,
        };
        Ok(Packet::new(source, destination, body, data))
    }

    /// Parses a received frame.
    ///
    /// # Errors
    /// - [`PacketError::Truncated`] for an empty buffer, or a sealed frame
    ///   too short to hold a nonce and tag.
    /// - [`PacketError::Decryption`] if the frame does not authenticate.
    /// - [`PacketError::Decode`] for anything the codec rejects, including
    ///   unknown packet types and out-of-range player fields.
    pub fn parse(&self, data: &[u8]) -> Result<Packet, PacketError> {
        if data.is_empty() {
            return Err(PacketError::Truncated(0));
        }
        let plain;
        let frame = match &self.cipher {
            Some(cipher) => {
                plain = open(cipher, data)?;
                plain.as_slice()
            }
            None => data,
        };
        let wire: Wire<PacketBody> = self.codec.decode(frame)?;
        Ok(Packet::new(wire.src, wire.dst, wire.body, data.to_vec()))
    }
}

impl<C: Codec + fmt::Debug> fmt::Debug for PacketFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketFactory")
            .field("codec", &self.codec)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

fn seal(cipher: &ChaCha20Poly1305, plain: &[u8]) -> Result<Vec<u8>, PacketError> {
    let nonce: [u8; NONCE_SIZE] = rand::random();
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|_| PacketError::Encryption)?;
    let mut frame = Vec::with_capacity(NONCE_SIZE + sealed.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&sealed);
    Ok(frame)
}

fn open(cipher: &ChaCha20Poly1305, frame: &[u8]) -> Result<Vec<u8>, PacketError> {
    if frame.len() < NONCE_SIZE + TAG_SIZE {
        return Err(PacketError::Truncated(frame.len()));
    }
    let (nonce, sealed) = frame.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| PacketError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cookie, PlayerSlot};

    fn join_accept() -> PacketBody {
        PacketBody::JoinAccept {
            cookie: Cookie(42),
            new_player: PlayerSlot::new(2).unwrap(),
            info: vec![9; 22],
        }
    }

    #[test]
    fn test_make_packet_parses_back_to_same_fields() {
        let factory = PacketFactory::new();
        let packet = factory
            .make_packet(PlayerSlot::HOST, Address::Player(2), join_accept())
            .unwrap();

        let parsed = factory.parse(packet.data()).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.source(), Address::Player(0));
    }

    #[test]
    fn test_parse_empty_buffer_is_truncated() {
        let factory = PacketFactory::new();
        assert!(matches!(factory.parse(&[]), Err(PacketError::Truncated(0))));
    }

    #[test]
    fn test_parse_unknown_type_fails_decode() {
        let factory = PacketFactory::new();
        let frame = br#"{"src":0,"dst":255,"body":{"type":"Teleport"}}"#;
        assert!(matches!(factory.parse(frame), Err(PacketError::Decode(_))));
    }

    #[test]
    fn test_parse_keeps_out_of_range_source() {
        // Source validation belongs to the engine; the codec only decodes.
        let factory = PacketFactory::new();
        let frame = br#"{"src":9,"dst":255,"body":{"type":"InfoRequest"}}"#;
        let packet = factory.parse(frame).unwrap();
        assert_eq!(packet.source(), Address::Player(9));
        assert_eq!(packet.source().slot(), None);
    }

    #[test]
    fn test_sealed_frame_is_not_plaintext() {
        let mut factory = PacketFactory::new();
        factory.set_password("hunter2");
        let packet = factory
            .make_packet(Address::Master, Address::Broadcast, PacketBody::InfoRequest)
            .unwrap();

        assert!(serde_json::from_slice::<serde_json::Value>(packet.data()).is_err());
        assert_eq!(factory.parse(packet.data()).unwrap().body(), &PacketBody::InfoRequest);
    }

    #[test]
    fn test_parse_with_wrong_password_fails_decryption() {
        let mut sender = PacketFactory::new();
        sender.set_password("right");
        let mut receiver = PacketFactory::new();
        receiver.set_password("wrong");

        let packet = sender.make_packet(PlayerSlot::HOST, Address::Broadcast, join_accept()).unwrap();
        assert!(matches!(
            receiver.parse(packet.data()),
            Err(PacketError::Decryption)
        ));
    }

    #[test]
    fn test_parse_short_sealed_frame_is_truncated() {
        let mut factory = PacketFactory::new();
        factory.set_password("pw");
        assert!(matches!(
            factory.parse(&[0u8; NONCE_SIZE + TAG_SIZE - 1]),
            Err(PacketError::Truncated(27))
        ));
    }

    #[test]
    fn test_clear_password_returns_to_plaintext() {
        let mut factory = PacketFactory::new();
        factory.set_password("pw");
        factory.clear_password();
        assert!(!factory.is_encrypted());

        let packet = factory
            .make_packet(Address::Master, Address::Broadcast, PacketBody::InfoRequest)
            .unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(packet.data()).is_ok());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let mut factory = PacketFactory::new();
        factory.set_password("pw");
        let debug = format!("{factory:?}");
        assert!(debug.contains("encrypted: true"));
    }
}
