//! Wire protocol for crawlnet.
//!
//! This crate defines what peers say to each other:
//!
//! - **Types** ([`PacketBody`], [`Address`], [`PlayerSlot`], etc.):
//!   the values that travel inside packets.
//! - **Packets** ([`Packet`], [`PacketFactory`]): typed packets paired
//!   with their encoded frames, optionally sealed with the game password.
//! - **Announcements** ([`GameData`], [`GameAnnouncement`]): the layout
//!   of `INFO_REPLY` payloads used for game discovery.
//! - **Errors** ([`PacketError`]): why a buffer was not accepted.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the engine
//! (slots, peers, handshakes). It doesn't know about endpoints or
//! connections; it only turns packets into bytes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Engine (peer table, session)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod factory;
mod game;
mod packet;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use error::PacketError;
pub use factory::{NONCE_SIZE, PacketFactory, TAG_SIZE};
pub use game::{GameAnnouncement, GameData, GameInfo, INFO_HEADER_SIZE, PLAYER_NAME_LENGTH};
pub use packet::Packet;
pub use types::{
    Address, Cookie, LeaveReason, MAX_PLRS, PacketBody, PacketType, PlayerSlot, Turn,
};
