//! Per-slot peer records and discovery-list entries.

use std::collections::VecDeque;

use crawlnet_protocol::{GameData, Packet};

/// What the engine knows about the participant in one slot.
///
/// A present `send_queue` means the handshake with this peer is not yet
/// confirmed: outbound traffic is buffered instead of sent.
#[derive(Debug)]
pub(crate) struct Peer<E> {
    pub(crate) endpoint: Option<E>,
    pub(crate) send_queue: Option<VecDeque<Packet>>,
}

impl<E> Peer<E> {
    /// A peer known by address whose handshake is still pending.
    pub(crate) fn pending(endpoint: E) -> Self {
        Self {
            endpoint: Some(endpoint),
            send_queue: Some(VecDeque::new()),
        }
    }

    /// A peer that is already confirmed reachable.
    pub(crate) fn confirmed(endpoint: E) -> Self {
        Self {
            endpoint: Some(endpoint),
            send_queue: None,
        }
    }
}

// Derived `Default` would demand `E: Default`.
impl<E> Default for Peer<E> {
    fn default() -> Self {
        Self {
            endpoint: None,
            send_queue: None,
        }
    }
}

/// A discovered game, keyed by name in the engine's discovery list.
#[derive(Debug, Clone)]
pub(crate) struct GameListEntry<E> {
    pub(crate) game_data: GameData,
    pub(crate) player_names: Vec<String>,
    /// Who answered; the join request goes here.
    pub(crate) endpoint: E,
}
