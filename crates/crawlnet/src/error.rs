//! Unified error type for crawlnet.

use std::fmt;

use crawlnet_protocol::PacketError;
use crawlnet_session::SessionError;
use crawlnet_transport::TransportError;

/// Which bounded wait inside `create`/`join` ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// The transport never reported the network as online.
    Connectivity,
    /// No host answered discovery for the requested game name.
    Discovery,
    /// The host never granted a slot.
    JoinAccept,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Connectivity => "connectivity",
            Self::Discovery => "discovery",
            Self::JoinAccept => "join accept",
        };
        f.write_str(stage)
    }
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant generates `From` impls,
/// so `?` converts lower-layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CrawlnetError {
    /// A transport-level error (bind, send, bad address).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet could not be built or parsed.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// A session-level error (not in a game, vacant slot).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A bounded wait in `create` or `join` expired. Nothing from the
    /// attempt is left behind.
    #[error("timed out waiting for {0}")]
    Timeout(WaitStage),

    /// Application traffic addressed to `MASTER`, which is reserved for
    /// discovery and join control messages.
    #[error("MASTER is not a valid destination for outbound traffic")]
    IllegalDestination,

    /// `create` or `join` on an engine that is already in a game.
    #[error("already in a game")]
    AlreadyInGame,

    /// A rebuild of the engine failed and no engine is in place. The next
    /// `create`, `join` or `reset` tries again.
    #[error("no network engine in place")]
    NoEngine,
}
