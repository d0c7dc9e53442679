//! Session state for crawlnet.
//!
//! This crate holds what the engine knows about the game it is in:
//!
//! 1. **Session table** ([`Session`]): this node's slot, who else is
//!    connected, queued turns and messages, player names, game setup.
//! 2. **Turn rounds** ([`TurnRound`]): one turn per connected slot,
//!    handed to the simulation only when all of them have arrived.
//! 3. **Events** ([`EventRegistry`]): callbacks the simulation registers
//!    to hear about games created, players connecting, players leaving.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (above)  ← routes packets, owns one Session and one EventRegistry
//!     ↕
//! Session Layer (this crate)  ← per-slot state and lifecycle events
//!     ↕
//! Protocol Layer (below)  ← provides PlayerSlot, Turn, LeaveReason
//! ```
//!
//! Nothing here touches the network.

mod error;
mod event;
mod session;

pub use error::SessionError;
pub use event::{Event, EventHandler, EventRegistry, EventType};
pub use session::{PlayerState, Session, TurnRound, TurnStatus};
