//! # crawlnet
//!
//! Peer-to-peer mesh synchronization for small real-time multiplayer games.
//!
//! Up to [`MAX_PLRS`] participants find each other, agree on player slots,
//! and exchange turns and messages over a full mesh. Any [`Transport`] can
//! carry the traffic; [`LoopbackHub`] runs a whole mesh in one process.
//!
//! ## Layers
//!
//! ```text
//! ResilientNetwork  ← rebuilds the engine, replays registrations
//!     ↕
//! ProtocolEngine    ← peer table, join/create, discovery, send/recv pump
//!     ↕
//! Session           ← slots, turn queues, messages, events (crawlnet-session)
//!     ↕
//! PacketFactory     ← packets ↔ frames, password sealing (crawlnet-protocol)
//!     ↕
//! Transport         ← moves bytes (crawlnet-transport)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crawlnet::prelude::*;
//!
//! let hub = LoopbackHub::new();
//! let mut host = ProtocolEngine::new(hub.transport());
//! host.setup_gameinfo(GameData::default().to_bytes().to_vec());
//! let slot = host.create("game1")?;
//! assert_eq!(slot, PlayerSlot::HOST);
//!
//! // Elsewhere: ProtocolEngine::new(hub.transport()).join("game1"),
//! // while the host keeps calling poll().
//! host.poll();
//! # Ok::<(), CrawlnetError>(())
//! ```

mod config;
mod engine;
mod error;
mod network;
mod resilient;

pub use config::{NetConfig, WaitBudget};
pub use engine::{EngineState, ProtocolEngine};
pub use error::{CrawlnetError, WaitStage};
pub use network::{Destination, Network};
pub use resilient::{NetworkFactory, ResilientNetwork};

pub use crawlnet_protocol::{
    Address, GameAnnouncement, GameData, GameInfo, LeaveReason, MAX_PLRS, PacketError,
    PlayerSlot, Turn,
};
pub use crawlnet_session::{
    Event, EventHandler, EventType, SessionError, TurnRound, TurnStatus,
};
pub use crawlnet_transport::{
    Endpoint, LoopbackEndpoint, LoopbackHub, LoopbackTransport, Transport, TransportError,
};
#[cfg(feature = "websocket")]
pub use crawlnet_transport::{WebSocketConfig, WebSocketTransport};

/// Everything a game needs in one import.
pub mod prelude {
    pub use crate::{
        CrawlnetError, Destination, Event, EventHandler, EventType, GameData, GameInfo,
        LeaveReason, LoopbackHub, NetConfig, Network, PlayerSlot, ProtocolEngine,
        ResilientNetwork, Transport, TurnRound, TurnStatus, WaitBudget,
    };
    #[cfg(feature = "websocket")]
    pub use crate::{WebSocketConfig, WebSocketTransport};
}
