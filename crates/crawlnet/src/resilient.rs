//! A [`Network`] that can be rebuilt without re-plumbing callers.
//!
//! [`ResilientNetwork`] owns a replaceable engine and remembers every
//! side-effecting registration made through it: event handlers, the game
//! setup blob, the password, player names. [`reset`](ResilientNetwork::reset)
//! throws the engine away, builds a fresh one from the factory, and replays
//! those registrations onto it.
//!
//! ```text
//!                ┌──────────────── ResilientNetwork ───────────────┐
//!  caller ──────▶│ registrations (handlers, game info, pw, names)  │
//!                │        │ replay on reset()                      │
//!                │        ▼                                        │
//!                │  Box<dyn Network>  ◀── factory() ───────────────│
//!                └─────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crawlnet_protocol::{GameInfo, LeaveReason, PlayerSlot};
use crawlnet_session::{EventHandler, EventRegistry, EventType, TurnRound};

use crate::{CrawlnetError, Destination, Network};

/// Builds a fresh engine. Called once at construction and once per reset.
///
/// The previous engine is always dropped before the factory runs, so a
/// factory may bind the same fixed address every time.
pub type NetworkFactory = Box<dyn FnMut() -> Result<Box<dyn Network>, CrawlnetError> + Send>;

/// Supervisor that can swap its engine for a fresh one.
pub struct ResilientNetwork {
    /// `None` only after a rebuild failed.
    inner: Option<Box<dyn Network>>,
    factory: NetworkFactory,
    handlers: EventRegistry,
    game_init_info: Option<Vec<u8>>,
    password: Option<String>,
    player_names: BTreeMap<PlayerSlot, String>,
}

impl ResilientNetwork {
    /// Builds the first engine.
    ///
    /// # Errors
    /// Whatever the factory returns.
    pub fn new(mut factory: NetworkFactory) -> Result<Self, CrawlnetError> {
        let inner = factory()?;
        Ok(Self {
            inner: Some(inner),
            factory,
            handlers: EventRegistry::new(),
            game_init_info: None,
            password: None,
            player_names: BTreeMap::new(),
        })
    }

    /// Replaces the engine with a fresh one and replays every recorded
    /// registration onto it.
    ///
    /// Any game the old engine was in is gone; its links close when it is
    /// dropped, which happens before the factory is called.
    ///
    /// # Errors
    /// Whatever the factory returns. The wrapper is then left without an
    /// engine until a later reset succeeds.
    pub fn reset(&mut self) -> Result<(), CrawlnetError> {
        drop(self.inner.take());
        let mut inner = (self.factory)().inspect_err(|e| {
            tracing::warn!(error = %e, "network engine rebuild failed");
        })?;
        for (event_type, handler) in self.handlers.iter() {
            inner.register_event_handler(event_type, Arc::clone(handler));
        }
        if let Some(info) = &self.game_init_info {
            inner.setup_gameinfo(info.clone());
        }
        if let Some(password) = &self.password {
            inner.setup_password(password);
        }
        for (slot, name) in &self.player_names {
            inner.set_player_name(*slot, name);
        }
        self.inner = Some(inner);
        tracing::debug!(handlers = self.handlers.iter().count(), "network engine rebuilt");
        Ok(())
    }

    /// The current engine, if the last rebuild succeeded.
    pub fn inner(&self) -> Option<&dyn Network> {
        self.inner.as_deref()
    }

    fn engine(&mut self) -> Result<&mut Box<dyn Network>, CrawlnetError> {
        self.inner.as_mut().ok_or(CrawlnetError::NoEngine)
    }
}

impl Network for ResilientNetwork {
    fn create(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        self.reset()?;
        self.engine()?.create(game_name)
    }

    fn join(&mut self, game_name: &str) -> Result<PlayerSlot, CrawlnetError> {
        // The joiner learns the game setup from the host.
        self.game_init_info = None;
        self.reset()?;
        self.engine()?.join(game_name)
    }

    fn poll(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.poll();
        }
    }

    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), CrawlnetError> {
        self.engine()?.leave_game(reason)
    }

    fn drop_player(&mut self, slot: PlayerSlot, reason: LeaveReason) -> Result<(), CrawlnetError> {
        self.engine()?.drop_player(slot, reason)
    }

    fn send_message(&mut self, dest: Destination, message: &[u8]) -> Result<(), CrawlnetError> {
        self.engine()?.send_message(dest, message)
    }

    fn receive_message(&mut self) -> Option<(PlayerSlot, Vec<u8>)> {
        self.inner.as_mut()?.receive_message()
    }

    fn send_turn(&mut self, data: &[u8]) -> Result<(), CrawlnetError> {
        self.engine()?.send_turn(data)
    }

    fn receive_turns(&mut self) -> TurnRound {
        self.inner
            .as_mut()
            .map(|inner| inner.receive_turns())
            .unwrap_or_default()
    }

    fn owner_turns_waiting(&self) -> usize {
        self.inner().map_or(0, |inner| inner.owner_turns_waiting())
    }

    fn turns_in_transit(&self) -> usize {
        self.inner().map_or(0, |inner| inner.turns_in_transit())
    }

    fn register_event_handler(&mut self, event_type: EventType, handler: EventHandler) {
        self.handlers
            .register(event_type, Arc::clone(&handler));
        if let Some(inner) = &mut self.inner {
            inner.register_event_handler(event_type, handler);
        }
    }

    fn unregister_event_handler(&mut self, event_type: EventType) {
        self.handlers.unregister(event_type);
        if let Some(inner) = &mut self.inner {
            inner.unregister_event_handler(event_type);
        }
    }

    fn setup_gameinfo(&mut self, info: Vec<u8>) {
        self.game_init_info = Some(info.clone());
        if let Some(inner) = &mut self.inner {
            inner.setup_gameinfo(info);
        }
    }

    fn set_player_name(&mut self, slot: PlayerSlot, name: &str) {
        self.player_names.insert(slot, name.to_owned());
        if let Some(inner) = &mut self.inner {
            inner.set_player_name(slot, name);
        }
    }

    fn setup_password(&mut self, password: &str) {
        self.password = Some(password.to_owned());
        if let Some(inner) = &mut self.inner {
            inner.setup_password(password);
        }
    }

    fn clear_password(&mut self) {
        self.password = None;
        if let Some(inner) = &mut self.inner {
            inner.clear_password();
        }
    }

    fn make_default_gamename(&self) -> String {
        self.inner()
            .map(|inner| inner.make_default_gamename())
            .unwrap_or_default()
    }

    fn send_info_request(&mut self) -> Result<(), CrawlnetError> {
        self.engine()?.send_info_request()
    }

    fn clear_gamelist(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.clear_gamelist();
        }
    }

    fn get_gamelist(&mut self) -> Vec<GameInfo> {
        self.inner
            .as_mut()
            .map(|inner| inner.get_gamelist())
            .unwrap_or_default()
    }

    fn is_game_host(&self) -> bool {
        self.inner().is_some_and(|inner| inner.is_game_host())
    }

    fn self_slot(&self) -> Option<PlayerSlot> {
        self.inner()?.self_slot()
    }
}

impl std::fmt::Debug for ResilientNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientNetwork")
            .field("handlers", &self.handlers)
            .field("has_game_info", &self.game_init_info.is_some())
            .field("has_password", &self.password.is_some())
            .field("player_names", &self.player_names)
            .field("has_engine", &self.inner.is_some())
            .finish_non_exhaustive()
    }
}
