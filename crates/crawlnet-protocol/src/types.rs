//! Core protocol types for crawlnet's wire format.
//!
//! These are the values that travel inside packets: who a packet is from
//! and for, the join correlation cookie, and the tagged union of packet
//! bodies the engine dispatches on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of participants in one game.
pub const MAX_PLRS: usize = 4;

/// Wire value of [`Address::Broadcast`].
const BROADCAST_WIRE: u8 = 0xFF;
/// Wire value of [`Address::Master`].
const MASTER_WIRE: u8 = 0xFE;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's slot in the game, always in `0..MAX_PLRS`.
///
/// The only way to obtain one is [`PlayerSlot::new`] (or deserializing,
/// which runs the same check), so holding a `PlayerSlot` means the index is
/// valid for any `[_; MAX_PLRS]` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct PlayerSlot(u8);

impl PlayerSlot {
    /// The slot a game's creator always takes.
    pub const HOST: PlayerSlot = PlayerSlot(0);

    /// Returns the slot for `raw`, or `None` if it is out of range.
    pub fn new(raw: u8) -> Option<Self> {
        (usize::from(raw) < MAX_PLRS).then_some(Self(raw))
    }

    /// Returns the slot as a table index.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Returns the raw slot number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterates over every slot in ascending order.
    pub fn all() -> impl Iterator<Item = PlayerSlot> {
        (0..MAX_PLRS as u8).map(PlayerSlot)
    }
}

impl TryFrom<u8> for PlayerSlot {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("player slot {raw} out of range"))
    }
}

impl From<PlayerSlot> for u8 {
    fn from(slot: PlayerSlot) -> u8 {
        slot.0
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Source or destination of a packet.
///
/// `Player` keeps the raw byte: a peer may claim any source number, and the
/// engine must be able to see (and drop) out-of-range claims rather than
/// fail the whole parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Address {
    /// A specific participant.
    Player(u8),
    /// Every participant.
    Broadcast,
    /// Whoever answers discovery and join requests for the game.
    Master,
}

impl Address {
    /// Returns the slot if this address names a valid participant.
    pub fn slot(self) -> Option<PlayerSlot> {
        match self {
            Self::Player(raw) => PlayerSlot::new(raw),
            Self::Broadcast | Self::Master => None,
        }
    }
}

impl From<PlayerSlot> for Address {
    fn from(slot: PlayerSlot) -> Self {
        Self::Player(slot.get())
    }
}

impl From<u8> for Address {
    fn from(raw: u8) -> Self {
        match raw {
            BROADCAST_WIRE => Self::Broadcast,
            MASTER_WIRE => Self::Master,
            n => Self::Player(n),
        }
    }
}

impl From<Address> for u8 {
    fn from(addr: Address) -> u8 {
        match addr {
            Address::Player(n) => n,
            Address::Broadcast => BROADCAST_WIRE,
            Address::Master => MASTER_WIRE,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(n) => write!(f, "P{n}"),
            Self::Broadcast => f.write_str("BROADCAST"),
            Self::Master => f.write_str("MASTER"),
        }
    }
}

/// Correlates a `JOIN_REQUEST` with its `JOIN_ACCEPT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(pub u32);

impl Cookie {
    /// Generates a fresh random cookie.
    pub fn generate() -> Self {
        Self(rand::random())
    }
}

// ---------------------------------------------------------------------------
// Payload values
// ---------------------------------------------------------------------------

/// Why a participant left the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeaveReason {
    /// The player quit.
    #[default]
    Exit,
    /// The game is over.
    Ending,
    /// The player was dropped by another participant.
    Drop,
}

/// One simulation turn from one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Per-sender sequence number, starting at 1.
    pub seq: u32,
    /// Opaque simulation data.
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Packet bodies
// ---------------------------------------------------------------------------

/// Discriminant of a [`PacketBody`], handy for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Message,
    Turn,
    JoinRequest,
    JoinAccept,
    Connect,
    Disconnect,
    InfoRequest,
    InfoReply,
    EchoRequest,
    EchoReply,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Message => "MESSAGE",
            Self::Turn => "TURN",
            Self::JoinRequest => "JOIN_REQUEST",
            Self::JoinAccept => "JOIN_ACCEPT",
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::InfoRequest => "INFO_REQUEST",
            Self::InfoReply => "INFO_REPLY",
            Self::EchoRequest => "ECHO_REQUEST",
            Self::EchoReply => "ECHO_REPLY",
        };
        f.write_str(name)
    }
}

/// Everything a packet can carry.
///
/// `#[serde(tag = "type")]` puts the variant name next to its fields, so a
/// frame reads `{"type":"Connect","new_player":2,"address":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PacketBody {
    // -- In-game traffic --
    /// Free-form message for the simulation layer.
    Message { message: Vec<u8> },

    /// A simulation turn.
    Turn { turn: Turn },

    // -- Join handshake --
    /// Joiner → host: "give me a slot".
    JoinRequest { cookie: Cookie, info: Vec<u8> },

    /// Host → joiner: "you are `new_player`; here is the game setup".
    JoinAccept {
        cookie: Cookie,
        new_player: PlayerSlot,
        info: Vec<u8>,
    },

    /// Host → member: "`new_player` can be reached at `address`".
    Connect {
        new_player: PlayerSlot,
        address: Vec<u8>,
    },

    /// Member → everyone: "`new_player` is leaving".
    Disconnect {
        new_player: PlayerSlot,
        reason: LeaveReason,
    },

    // -- Discovery --
    /// "Which games are out there?"
    InfoRequest,

    /// "This one": an announcement payload, see [`crate::GameAnnouncement`].
    InfoReply { info: Vec<u8> },

    // -- Reachability handshake --
    /// Probe carrying the sender's clock in milliseconds.
    EchoRequest { time: u32 },

    /// Answer echoing the probe's clock value.
    EchoReply { time: u32 },
}

impl PacketBody {
    /// Returns the discriminant of this body.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Message { .. } => PacketType::Message,
            Self::Turn { .. } => PacketType::Turn,
            Self::JoinRequest { .. } => PacketType::JoinRequest,
            Self::JoinAccept { .. } => PacketType::JoinAccept,
            Self::Connect { .. } => PacketType::Connect,
            Self::Disconnect { .. } => PacketType::Disconnect,
            Self::InfoRequest => PacketType::InfoRequest,
            Self::InfoReply { .. } => PacketType::InfoReply,
            Self::EchoRequest { .. } => PacketType::EchoRequest,
            Self::EchoReply { .. } => PacketType::EchoReply,
        }
    }

    /// Returns `true` for the two reachability-probe bodies, which are
    /// never held in a send queue.
    pub fn is_echo(&self) -> bool {
        matches!(self, Self::EchoRequest { .. } | Self::EchoReply { .. })
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_slot_new_rejects_out_of_range() {
        assert_eq!(PlayerSlot::new(3).map(PlayerSlot::get), Some(3));
        assert_eq!(PlayerSlot::new(MAX_PLRS as u8), None);
        assert_eq!(PlayerSlot::new(0xFF), None);
    }

    #[test]
    fn test_player_slot_all_is_ascending() {
        let slots: Vec<u8> = PlayerSlot::all().map(PlayerSlot::get).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_player_slot_serializes_as_plain_number() {
        let slot = PlayerSlot::new(2).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "2");
    }

    #[test]
    fn test_player_slot_deserialize_rejects_out_of_range() {
        let result: Result<PlayerSlot, _> = serde_json::from_str("9");
        assert!(result.is_err());
    }

    #[test]
    fn test_address_wire_values() {
        assert_eq!(u8::from(Address::Broadcast), 0xFF);
        assert_eq!(u8::from(Address::Master), 0xFE);
        assert_eq!(Address::from(0xFF), Address::Broadcast);
        assert_eq!(Address::from(0xFE), Address::Master);
        assert_eq!(Address::from(7), Address::Player(7));
    }

    #[test]
    fn test_address_slot_only_for_valid_players() {
        assert_eq!(Address::Player(1).slot(), PlayerSlot::new(1));
        assert_eq!(Address::Player(9).slot(), None);
        assert_eq!(Address::Broadcast.slot(), None);
        assert_eq!(Address::Master.slot(), None);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(Address::Player(2).to_string(), "P2");
        assert_eq!(Address::Master.to_string(), "MASTER");
    }

    #[test]
    fn test_body_json_is_internally_tagged() {
        let body = PacketBody::EchoRequest { time: 15 };
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "EchoRequest");
        assert_eq!(json["time"], 15);
    }

    #[test]
    fn test_body_with_invalid_player_fails_to_decode() {
        let json = r#"{"type":"Connect","new_player":7,"address":[]}"#;
        let result: Result<PacketBody, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_is_echo_only_for_probes() {
        assert!(PacketBody::EchoRequest { time: 0 }.is_echo());
        assert!(PacketBody::EchoReply { time: 0 }.is_echo());
        assert!(!PacketBody::InfoRequest.is_echo());
        assert!(!PacketBody::Message { message: vec![] }.is_echo());
    }

    #[test]
    fn test_packet_type_display_uses_wire_names() {
        assert_eq!(PacketType::JoinAccept.to_string(), "JOIN_ACCEPT");
        assert_eq!(
            PacketBody::InfoReply { info: vec![] }.packet_type(),
            PacketType::InfoReply
        );
    }
}
