//! The protocol engine: peer table, join/create state machine, discovery
//! list, and the send/receive pump.
//!
//! # Threading
//!
//! The engine is single-threaded and caller-driven. All state changes
//! happen inside [`Network::poll`] (and the operations that poll
//! internally) or inside `create`/`join`, which busy-poll with short sleeps
//! for up to [`NetConfig::wait`] per stage. There is no background task.
//!
//! # Join sequence
//!
//! ```text
//!  joiner                                   host (slot 0)           member (slot 1)
//!    │── INFO_REQUEST (oob multicast) ──────▶│
//!    │◀────────────── INFO_REPLY (oob) ──────│
//!    │── JOIN_REQUEST ──────────────────────▶│
//!    │                                       │── CONNECT(2, joiner) ──▶│
//!    │◀────────────── CONNECT(1, member) ────│
//!    │◀────────────── JOIN_ACCEPT(2) ────────│
//!    │◀──────────────────────────────────────┼──── ECHO_REQUEST ───────│
//!    │── ECHO_REPLY ─────────────────────────┼────────────────────────▶│
//! ```
//!
//! The lower slot of each pair starts the echo exchange unless the link is
//! already up, in which case either side may.

mod local;
mod peer;
mod recv;

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use crawlnet_protocol::{
    Address, Cookie, GameInfo, LeaveReason, MAX_PLRS, Packet, PacketBody, PacketFactory,
    PlayerSlot,
};
use crawlnet_session::{Event, EventHandler, EventRegistry, EventType, Session, TurnRound};
use crawlnet_transport::{Transport, TransportError};
use tracing::{debug, info};

use crate::{CrawlnetError, Destination, NetConfig, Network, WaitStage};

use self::peer::{GameListEntry, Peer};

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Where the engine is in its lifecycle.
///
/// ```text
/// joining:  Idle → AwaitingConnectivity → Discovering → AwaitingJoinAccept → Connected
/// hosting:  Idle → AwaitingConnectivity → Hosting
/// ```
///
/// Any failed wait, `leave_game`, or being dropped by the game returns to
/// `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    AwaitingConnectivity,
    Discovering,
    AwaitingJoinAccept,
    Connected,
    Hosting,
}

impl EngineState {
    /// Returns `true` once this node holds a slot.
    pub fn in_game(self) -> bool {
        matches!(self, Self::Connected | Self::Hosting)
    }
}

// ---------------------------------------------------------------------------
// ProtocolEngine
// ---------------------------------------------------------------------------

/// A mesh participant running over transport `T`.
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    factory: PacketFactory,
    config: NetConfig,
    peers: [Peer<T::Endpoint>; MAX_PLRS],
    /// Host being negotiated with, between discovery and `JOIN_ACCEPT`.
    first_peer: Option<T::Endpoint>,
    game_list: BTreeMap<String, GameListEntry<T::Endpoint>>,
    session: Session,
    events: EventRegistry,
    game_name: String,
    is_host: bool,
    state: EngineState,
    /// Correlates our `JOIN_REQUEST` with the host's `JOIN_ACCEPT`.
    cookie_self: Option<Cookie>,
    /// Time base for echo timestamps.
    epoch: Instant,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Creates an idle engine with the default [`NetConfig`].
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, NetConfig::default())
    }

    pub fn with_config(transport: T, config: NetConfig) -> Self {
        Self {
            transport,
            factory: PacketFactory::new(),
            config: config.validated(),
            peers: Default::default(),
            first_peer: None,
            game_list: BTreeMap::new(),
            session: Session::new(),
            events: EventRegistry::new(),
            game_name: String::new(),
            is_host: false,
            state: EngineState::Idle,
            cookie_self: None,
            epoch: Instant::now(),
        }
    }

    // -- Introspection --

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The session table: connected slots, queued turns, names, latency.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The endpoint held for `slot`, if any. Never set for this node's own
    /// slot.
    pub fn peer_endpoint(&self, slot: PlayerSlot) -> Option<&T::Endpoint> {
        self.peers[slot.index()].endpoint.as_ref()
    }

    /// Returns `true` while the handshake with `slot` is unconfirmed.
    pub fn has_send_queue(&self, slot: PlayerSlot) -> bool {
        self.peers[slot.index()].send_queue.is_some()
    }

    /// Packets held for `slot` until its handshake completes.
    pub fn pending_len(&self, slot: PlayerSlot) -> usize {
        self.peers[slot.index()]
            .send_queue
            .as_ref()
            .map_or(0, |queue| queue.len())
    }

    /// Slots in use: this node's own plus every slot with a known endpoint.
    pub fn active_slots(&self) -> usize {
        PlayerSlot::all()
            .filter(|slot| {
                Some(*slot) == self.session.plr_self() || self.peers[slot.index()].endpoint.is_some()
            })
            .count()
    }

    /// The host endpoint that answered discovery for `game_name`.
    pub fn discovered_endpoint(&self, game_name: &str) -> Option<&T::Endpoint> {
        self.game_list.get(game_name).map(|entry| &entry.endpoint)
    }

    /// The participant that answers discovery: the lowest slot in use.
    pub fn master(&self) -> Option<PlayerSlot> {
        let lowest_peer = PlayerSlot::all().find(|slot| self.peers[slot.index()].endpoint.is_some());
        match (self.session.plr_self(), lowest_peer) {
            (Some(me), Some(peer)) => Some(me.min(peer)),
            (me, peer) => me.or(peer),
        }
    }

    // -- Create / join --

    fn create_game(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        if self.state != EngineState::Idle {
            return Err(CrawlnetError::AlreadyInGame);
        }
        self.game_name = game_name.to_owned();
        self.is_host = true;

        self.state = EngineState::AwaitingConnectivity;
        if !self.wait_network() {
            self.abandon_game();
            return Err(CrawlnetError::Timeout(WaitStage::Connectivity));
        }

        self.connect_slot(PlayerSlot::HOST);
        self.session.set_self(PlayerSlot::HOST);
        self.state = EngineState::Hosting;
        info!(game = %self.game_name, "game created");
        Ok(PlayerSlot::HOST)
    }

    fn join_game(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        if self.state != EngineState::Idle {
            return Err(CrawlnetError::AlreadyInGame);
        }
        self.game_name = game_name.to_owned();
        self.is_host = false;

        let result = self.run_join();
        if result.is_err() {
            self.abandon_game();
        }
        result
    }

    fn run_join(&mut self) -> Result<PlayerSlot, CrawlnetError> {
        self.state = EngineState::AwaitingConnectivity;
        if !self.wait_network() {
            return Err(CrawlnetError::Timeout(WaitStage::Connectivity));
        }

        self.state = EngineState::Discovering;
        let host = self
            .wait_first_peer()
            .ok_or(CrawlnetError::Timeout(WaitStage::Discovery))?;
        debug!(game = %self.game_name, %host, "game discovered");

        self.state = EngineState::AwaitingJoinAccept;
        let cookie = Cookie::generate();
        self.cookie_self = Some(cookie);
        let request = self.factory.make_packet(
            Address::Broadcast,
            Address::Master,
            PacketBody::JoinRequest {
                cookie,
                info: self.session.game_init_info().to_vec(),
            },
        )?;
        self.transport.send(&host, request.data())?;

        let slot = self
            .wait_join()
            .ok_or(CrawlnetError::Timeout(WaitStage::JoinAccept))?;
        info!(game = %self.game_name, %slot, "joined game");
        Ok(slot)
    }

    fn wait_network(&mut self) -> bool {
        let budget = self.config.wait;
        for _ in 0..budget.iterations {
            if self.transport.network_online() {
                return true;
            }
            thread::sleep(budget.interval);
        }
        self.transport.network_online()
    }

    fn wait_first_peer(&mut self) -> Option<T::Endpoint> {
        let budget = self.config.wait;
        for _ in 0..budget.iterations {
            if let Some(entry) = self.game_list.get(&self.game_name) {
                self.first_peer = Some(entry.endpoint.clone());
                break;
            }
            if let Err(e) = self.request_info() {
                debug!(error = %e, "discovery request failed");
            }
            self.recv();
            thread::sleep(budget.interval);
        }
        if self.first_peer.is_none() {
            self.first_peer = self
                .game_list
                .get(&self.game_name)
                .map(|entry| entry.endpoint.clone());
        }
        self.first_peer.clone()
    }

    fn wait_join(&mut self) -> Option<PlayerSlot> {
        let budget = self.config.wait;
        for _ in 0..budget.iterations {
            self.recv();
            if let Some(slot) = self.session.plr_self() {
                return Some(slot);
            }
            thread::sleep(budget.interval);
        }
        None
    }

    /// Forgets every trace of the current or attempted game and closes all
    /// links it opened. Discovery results and setup survive.
    fn abandon_game(&mut self) {
        for slot in PlayerSlot::all() {
            let peer = std::mem::take(&mut self.peers[slot.index()]);
            if let Some(endpoint) = peer.endpoint {
                self.transport.disconnect(&endpoint);
            }
        }
        if let Some(host) = self.first_peer.take() {
            self.transport.disconnect(&host);
        }
        self.session.clear_game();
        self.cookie_self = None;
        self.state = EngineState::Idle;
    }

    // -- Shared helpers --

    fn request_info(&mut self) -> Result<(), CrawlnetError> {
        if !self.transport.network_online() {
            return Err(TransportError::Offline.into());
        }
        let packet =
            self.factory
                .make_packet(Address::Broadcast, Address::Master, PacketBody::InfoRequest)?;
        self.transport.send_oob_mc(packet.data())?;
        Ok(())
    }

    /// Marks `slot` connected and tells the simulation, once.
    fn connect_slot(&mut self, slot: PlayerSlot) {
        if self.session.connect(slot) {
            info!(%slot, "player connected");
            self.events.fire(&Event::connect(slot));
        }
    }

    /// Hands a frame to the transport. A failed send is not fatal: the
    /// transport reports the broken link through its disconnect queue.
    fn transmit(&mut self, to: &T::Endpoint, packet: &Packet) {
        if let Err(e) = self.transport.send(to, packet.data()) {
            debug!(peer = %to, kind = %packet.packet_type(), error = %e, "send failed");
        }
    }

    /// Milliseconds since the engine was built, truncated for echo payloads.
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn require_slot(&self) -> Result<PlayerSlot, CrawlnetError> {
        self.session
            .plr_self()
            .ok_or_else(|| crawlnet_session::SessionError::NotInGame.into())
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

impl<T: Transport> Network for ProtocolEngine<T> {
    fn create(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        self.create_game(game_name)
    }

    fn join(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        self.join_game(game_name)
    }

    fn poll(&mut self) {
        self.recv();
    }

    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), CrawlnetError> {
        self.leave(reason)
    }

    fn drop_player(&mut self, slot: PlayerSlot, reason: LeaveReason) -> Result<(), CrawlnetError> {
        self.drop_slot(slot, reason)
    }

    fn send_message(&mut self, dest: Destination, message: &[u8]) -> Result<(), CrawlnetError> {
        let me = self.require_slot()?;
        let packet = self.factory.make_packet(
            me,
            dest,
            PacketBody::Message {
                message: message.to_vec(),
            },
        )?;
        if dest == Destination::Broadcast || dest == Destination::Player(me) {
            self.session.push_message(me, message.to_vec());
        }
        self.send(&packet)
    }

    fn receive_message(&mut self) -> Option<(PlayerSlot, Vec<u8>)> {
        self.recv();
        self.session.pop_message()
    }

    fn send_turn(&mut self, data: &[u8]) -> Result<(), CrawlnetError> {
        let me = self.require_slot()?;
        let turn = self.session.next_turn(data.to_vec())?;
        let packet = self
            .factory
            .make_packet(me, Address::Broadcast, PacketBody::Turn { turn })?;
        self.send(&packet)
    }

    fn receive_turns(&mut self) -> TurnRound {
        self.recv();
        self.session.take_round()
    }

    fn owner_turns_waiting(&self) -> usize {
        self.session.owner_turns_waiting()
    }

    fn turns_in_transit(&self) -> usize {
        self.session.turns_in_transit()
    }

    fn register_event_handler(&mut self, event_type: EventType, handler: EventHandler) {
        self.events.register(event_type, handler);
    }

    fn unregister_event_handler(&mut self, event_type: EventType) {
        self.events.unregister(event_type);
    }

    fn setup_gameinfo(&mut self, info: Vec<u8>) {
        self.session.set_game_init_info(info);
    }

    fn set_player_name(&mut self, slot: PlayerSlot, name: &str) {
        self.session.set_name(slot, name);
    }

    fn setup_password(&mut self, password: &str) {
        self.factory.set_password(password);
    }

    fn clear_password(&mut self) {
        self.factory.clear_password();
    }

    fn make_default_gamename(&self) -> String {
        self.transport.make_default_gamename()
    }

    fn send_info_request(&mut self) -> Result<(), CrawlnetError> {
        self.request_info()
    }

    fn clear_gamelist(&mut self) {
        self.game_list.clear();
    }

    fn get_gamelist(&mut self) -> Vec<GameInfo> {
        self.recv();
        self.game_list
            .iter()
            .map(|(name, entry)| GameInfo {
                name: name.clone(),
                game_data: entry.game_data,
                players: entry.player_names.clone(),
            })
            .collect()
    }

    fn is_game_host(&self) -> bool {
        self.is_host
    }

    fn self_slot(&self) -> Option<PlayerSlot> {
        self.session.plr_self()
    }
}

impl<T: Transport> std::fmt::Debug for ProtocolEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("state", &self.state)
            .field("game_name", &self.game_name)
            .field("plr_self", &self.session.plr_self())
            .field("active_slots", &self.active_slots())
            .finish_non_exhaustive()
    }
}

/// Latency measured from an echo reply carrying `sent_ms`.
fn echo_latency(now_ms: u32, sent_ms: u32) -> Duration {
    Duration::from_millis(u64::from(now_ms.wrapping_sub(sent_ms)))
}
