//! The control surface the game layer drives.
//!
//! Both [`ProtocolEngine`](crate::ProtocolEngine) and
//! [`ResilientNetwork`](crate::ResilientNetwork) implement [`Network`], so a
//! game can hold a `Box<dyn Network>` and never care which one it has.

use crawlnet_protocol::{Address, GameInfo, LeaveReason, PlayerSlot};
use crawlnet_session::{EventHandler, EventType, TurnRound};

use crate::CrawlnetError;

/// Where application traffic may be sent.
///
/// `MASTER` is deliberately absent: it is reserved for discovery and join
/// control messages, so the game layer cannot address it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Player(PlayerSlot),
    Broadcast,
}

impl From<Destination> for Address {
    fn from(dest: Destination) -> Self {
        match dest {
            Destination::Player(slot) => Address::from(slot),
            Destination::Broadcast => Address::Broadcast,
        }
    }
}

impl From<PlayerSlot> for Destination {
    fn from(slot: PlayerSlot) -> Self {
        Self::Player(slot)
    }
}

/// Operations a game performs on its multiplayer layer.
///
/// Everything is synchronous. Calls that read inbound state
/// (`receive_message`, `receive_turns`, `get_gamelist`) pump the transport
/// first; otherwise the caller pumps with [`poll`](Network::poll).
pub trait Network: Send {
    // -- Lifecycle --

    /// Hosts a new game named `game_name`. Returns this node's slot (always
    /// the host slot).
    ///
    /// # Errors
    /// [`CrawlnetError::Timeout`] if the network never came online.
    fn create(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError>;

    /// Finds the game named `game_name` and joins it. Blocks for up to three
    /// bounded waits.
    ///
    /// # Errors
    /// [`CrawlnetError::Timeout`] naming the wait that expired. A failed
    /// join leaves no peer slot populated.
    fn join(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError>;

    /// Drains inbound traffic and disconnect notifications.
    fn poll(&mut self);

    /// Tells every peer this node is leaving, then closes all links.
    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), CrawlnetError>;

    /// Removes `slot` from the game for everyone.
    fn drop_player(&mut self, slot: PlayerSlot, reason: LeaveReason) -> Result<(), CrawlnetError>;

    // -- Traffic --

    fn send_message(&mut self, dest: Destination, message: &[u8]) -> Result<(), CrawlnetError>;

    /// Pops the oldest inbound message and its sender.
    fn receive_message(&mut self) -> Option<(PlayerSlot, Vec<u8>)>;

    /// Broadcasts this node's next turn.
    fn send_turn(&mut self, data: &[u8]) -> Result<(), CrawlnetError>;

    /// Returns the next round of turns, consuming it only if complete.
    fn receive_turns(&mut self) -> TurnRound;

    /// Rounds that could be consumed right now.
    fn owner_turns_waiting(&self) -> usize;

    /// This node's turns sent and not yet consumed.
    fn turns_in_transit(&self) -> usize;

    // -- Events --

    fn register_event_handler(&mut self, event_type: EventType, handler: EventHandler);

    fn unregister_event_handler(&mut self, event_type: EventType);

    // -- Setup --

    /// Sets the serialized game data handed to joiners and announced to
    /// browsers.
    fn setup_gameinfo(&mut self, info: Vec<u8>);

    fn set_player_name(&mut self, slot: PlayerSlot, name: &str);

    fn setup_password(&mut self, password: &str);

    fn clear_password(&mut self);

    fn make_default_gamename(&self) -> String;

    // -- Discovery --

    /// Broadcasts one discovery request.
    ///
    /// # Errors
    /// Fails if the network is offline or the broadcast could not be sent.
    fn send_info_request(&mut self) -> Result<(), CrawlnetError>;

    fn clear_gamelist(&mut self);

    /// Pumps, then lists every game discovered so far, by name.
    fn get_gamelist(&mut self) -> Vec<GameInfo>;

    // -- Queries --

    fn is_game_host(&self) -> bool;

    /// This node's slot, or `None` when not in a game.
    fn self_slot(&self) -> Option<PlayerSlot>;
}
