//! Error types for the session layer.

use crawlnet_protocol::PlayerSlot;

/// Errors that can occur while operating on the session table.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// This node has no slot yet: it is neither hosting nor joined.
    #[error("not in a game")]
    NotInGame,

    /// The slot is not occupied by a connected participant.
    #[error("player {0} is not connected")]
    NotConnected(PlayerSlot),
}
