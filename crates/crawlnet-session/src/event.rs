//! Lifecycle events raised to the simulation layer.
//!
//! The engine raises an [`Event`] whenever a game is entered, a participant
//! connects, or a participant leaves. The simulation subscribes with one
//! handler per [`EventType`]; registering again replaces the handler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crawlnet_protocol::{LeaveReason, PlayerSlot};

/// Kinds of lifecycle events.
///
/// `Ord` so registries iterate in a stable order when replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// This node entered a game. `data` carries the game-init blob.
    PlayerCreateGame,
    /// A participant is now reachable.
    PlayerConnect,
    /// A participant left, or this node was dropped.
    PlayerLeaveGame,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlayerCreateGame => "player_create_game",
            Self::PlayerConnect => "player_connect",
            Self::PlayerLeaveGame => "player_leave_game",
        };
        f.write_str(name)
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    /// The participant the event is about.
    pub player: PlayerSlot,
    /// Event payload; the game-init blob for `PlayerCreateGame`, else empty.
    pub data: Vec<u8>,
    /// Set for `PlayerLeaveGame`.
    pub reason: Option<LeaveReason>,
}

impl Event {
    pub fn create_game(player: PlayerSlot, game_init_info: Vec<u8>) -> Self {
        Self {
            event_type: EventType::PlayerCreateGame,
            player,
            data: game_init_info,
            reason: None,
        }
    }

    pub fn connect(player: PlayerSlot) -> Self {
        Self {
            event_type: EventType::PlayerConnect,
            player,
            data: Vec::new(),
            reason: None,
        }
    }

    pub fn leave(player: PlayerSlot, reason: LeaveReason) -> Self {
        Self {
            event_type: EventType::PlayerLeaveGame,
            player,
            data: Vec::new(),
            reason: Some(reason),
        }
    }
}

/// A callback for one [`EventType`].
///
/// `Arc` so the same handler can be installed on several engines, which is
/// what a wrapper replaying its registrations onto a fresh engine needs.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handlers by event type, at most one each.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: BTreeMap<EventType, EventHandler>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, replacing any previous one for `event_type`.
    pub fn register(&mut self, event_type: EventType, handler: EventHandler) {
        self.handlers.insert(event_type, handler);
    }

    /// Removes the handler for `event_type`. Unknown types are a no-op.
    pub fn unregister(&mut self, event_type: EventType) {
        self.handlers.remove(&event_type);
    }

    pub fn is_registered(&self, event_type: EventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    /// Calls the handler for the event's type, if any.
    pub fn fire(&self, event: &Event) {
        match self.handlers.get(&event.event_type) {
            Some(handler) => handler(event),
            None => tracing::trace!(event = %event.event_type, "no handler registered"),
        }
    }

    /// Iterates over the registrations in [`EventType`] order.
    pub fn iter(&self) -> impl Iterator<Item = (EventType, &EventHandler)> {
        self.handlers.iter().map(|(ty, handler)| (*ty, handler))
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (EventHandler, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: EventHandler = Arc::new(move |e: &Event| sink.lock().unwrap().push(e.clone()));
        (handler, seen)
    }

    #[test]
    fn test_fire_registered_handler_receives_event() {
        let (handler, seen) = recorder();
        let mut registry = EventRegistry::new();
        registry.register(EventType::PlayerConnect, handler);

        registry.fire(&Event::connect(PlayerSlot::HOST));

        assert_eq!(*seen.lock().unwrap(), vec![Event::connect(PlayerSlot::HOST)]);
    }

    #[test]
    fn test_fire_other_type_does_not_call_handler() {
        let (handler, seen) = recorder();
        let mut registry = EventRegistry::new();
        registry.register(EventType::PlayerConnect, handler);

        registry.fire(&Event::leave(PlayerSlot::HOST, LeaveReason::Exit));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_register_twice_replaces_handler() {
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        let mut registry = EventRegistry::new();
        registry.register(EventType::PlayerConnect, first);
        registry.register(EventType::PlayerConnect, second);

        registry.fire(&Event::connect(PlayerSlot::HOST));

        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unregister_unknown_type_is_noop() {
        let mut registry = EventRegistry::new();
        registry.unregister(EventType::PlayerLeaveGame);
        assert!(!registry.is_registered(EventType::PlayerLeaveGame));
    }

    #[test]
    fn test_iter_is_ordered_by_event_type() {
        let (h, _) = recorder();
        let mut registry = EventRegistry::new();
        registry.register(EventType::PlayerLeaveGame, Arc::clone(&h));
        registry.register(EventType::PlayerCreateGame, h);

        let types: Vec<EventType> = registry.iter().map(|(ty, _)| ty).collect();
        assert_eq!(types, vec![EventType::PlayerCreateGame, EventType::PlayerLeaveGame]);
    }

    #[test]
    fn test_leave_event_carries_reason() {
        let event = Event::leave(PlayerSlot::new(2).unwrap(), LeaveReason::Drop);
        assert_eq!(event.reason, Some(LeaveReason::Drop));
        assert!(event.data.is_empty());
    }
}
