//! The session table: what this node knows about every slot in the game.
//!
//! The engine owns exactly one [`Session`]. It records:
//! - WHICH slot this node occupies (`plr_self`)
//! - WHO else is connected, and the turns each has sent
//! - WHAT messages are waiting for the simulation
//! - HOW the game was set up (the game-init blob and player names)

use std::collections::VecDeque;
use std::time::Duration;

use crawlnet_protocol::{MAX_PLRS, PlayerSlot, Turn};

use crate::SessionError;

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// Everything tracked for one slot.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    /// Whether a participant currently occupies the slot.
    pub connected: bool,

    /// Turns received from this participant and not yet consumed, oldest
    /// first.
    pub turn_queue: VecDeque<Turn>,

    /// Last measured round-trip time, from an echo exchange.
    pub latency: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Turn rounds
// ---------------------------------------------------------------------------

/// Per-slot outcome of [`Session::take_round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnStatus {
    /// Nobody occupies the slot.
    #[default]
    Vacant,
    /// Connected, but no turn has arrived yet.
    Waiting,
    /// Connected and a turn is available.
    Arrived,
}

/// One simulation step's worth of turns.
///
/// `turns` is filled only when the round is complete, i.e. every connected
/// slot had a turn queued; otherwise nothing is consumed and `status` says
/// who the simulation is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnRound {
    pub status: [TurnStatus; MAX_PLRS],
    pub turns: [Option<Turn>; MAX_PLRS],
}

impl TurnRound {
    /// Returns `true` if the round's turns were consumed.
    pub fn is_complete(&self) -> bool {
        self.status
            .iter()
            .zip(&self.turns)
            .all(|(status, turn)| match status {
                TurnStatus::Vacant => true,
                TurnStatus::Waiting => false,
                TurnStatus::Arrived => turn.is_some(),
            })
            && self.status.iter().any(|s| *s != TurnStatus::Vacant)
    }

    /// Slots the round is still waiting on.
    pub fn waiting_on(&self) -> impl Iterator<Item = PlayerSlot> + '_ {
        PlayerSlot::all().filter(|slot| self.status[slot.index()] == TurnStatus::Waiting)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// This node's view of the game.
#[derive(Debug, Clone, Default)]
pub struct Session {
    plr_self: Option<PlayerSlot>,
    players: [PlayerState; MAX_PLRS],
    messages: VecDeque<(PlayerSlot, Vec<u8>)>,
    names: [String; MAX_PLRS],
    game_init_info: Vec<u8>,
    /// Sequence number of the last turn this node sent.
    turn_seq: u32,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Identity --

    pub fn plr_self(&self) -> Option<PlayerSlot> {
        self.plr_self
    }

    /// Adopts `slot` as this node's own and marks it connected.
    pub fn set_self(&mut self, slot: PlayerSlot) {
        self.plr_self = Some(slot);
        self.players[slot.index()].connected = true;
    }

    /// Forgets every slot, queue, and sequence number.
    ///
    /// Names and the game-init blob are configuration, not game state, and
    /// survive.
    pub fn clear_game(&mut self) {
        self.plr_self = None;
        self.players = Default::default();
        self.messages.clear();
        self.turn_seq = 0;
    }

    // -- Connectivity --

    /// Marks `slot` connected. Returns `false` if it already was.
    pub fn connect(&mut self, slot: PlayerSlot) -> bool {
        let player = &mut self.players[slot.index()];
        if player.connected {
            return false;
        }
        player.connected = true;
        true
    }

    /// Clears all state held for `slot`. Returns `false` if it was vacant.
    pub fn disconnect(&mut self, slot: PlayerSlot) -> bool {
        let was_connected = self.players[slot.index()].connected;
        self.players[slot.index()] = PlayerState::default();
        self.names[slot.index()].clear();
        self.messages.retain(|(from, _)| *from != slot);
        was_connected
    }

    pub fn is_connected(&self, slot: PlayerSlot) -> bool {
        self.players[slot.index()].connected
    }

    /// Connected slots in ascending order.
    pub fn connected_slots(&self) -> impl Iterator<Item = PlayerSlot> + '_ {
        PlayerSlot::all().filter(|slot| self.is_connected(*slot))
    }

    pub fn player(&self, slot: PlayerSlot) -> &PlayerState {
        &self.players[slot.index()]
    }

    pub fn set_latency(&mut self, slot: PlayerSlot, latency: Duration) {
        self.players[slot.index()].latency = Some(latency);
    }

    pub fn latency(&self, slot: PlayerSlot) -> Option<Duration> {
        self.players[slot.index()].latency
    }

    // -- Messages --

    pub fn push_message(&mut self, from: PlayerSlot, message: Vec<u8>) {
        self.messages.push_back((from, message));
    }

    pub fn pop_message(&mut self) -> Option<(PlayerSlot, Vec<u8>)> {
        self.messages.pop_front()
    }

    // -- Turns --

    /// Stamps `data` with this node's next sequence number and queues it as
    /// this node's own turn.
    ///
    /// # Errors
    /// Returns [`SessionError::NotInGame`] if this node has no slot.
    pub fn next_turn(&mut self, data: Vec<u8>) -> Result<Turn, SessionError> {
        let slot = self.plr_self.ok_or(SessionError::NotInGame)?;
        self.turn_seq = self.turn_seq.wrapping_add(1);
        let turn = Turn {
            seq: self.turn_seq,
            data,
        };
        self.players[slot.index()].turn_queue.push_back(turn.clone());
        Ok(turn)
    }

    /// Queues a turn received from `slot`.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] if `slot` is vacant; the turn
    /// is dropped.
    pub fn push_turn(&mut self, slot: PlayerSlot, turn: Turn) -> Result<(), SessionError> {
        let player = &mut self.players[slot.index()];
        if !player.connected {
            return Err(SessionError::NotConnected(slot));
        }
        player.turn_queue.push_back(turn);
        Ok(())
    }

    /// Consumes one turn from every connected slot if all of them have one.
    pub fn take_round(&mut self) -> TurnRound {
        let mut round = TurnRound::default();
        for (i, player) in self.players.iter().enumerate() {
            round.status[i] = match (player.connected, player.turn_queue.is_empty()) {
                (false, _) => TurnStatus::Vacant,
                (true, true) => TurnStatus::Waiting,
                (true, false) => TurnStatus::Arrived,
            };
        }
        if round.status.contains(&TurnStatus::Waiting)
            || !round.status.contains(&TurnStatus::Arrived)
        {
            return round;
        }
        for (i, player) in self.players.iter_mut().enumerate() {
            if player.connected {
                round.turns[i] = player.turn_queue.pop_front();
            }
        }
        round
    }

    /// Rounds that [`take_round`](Self::take_round) could complete right
    /// now: the shortest turn queue among connected slots.
    pub fn owner_turns_waiting(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.turn_queue.len())
            .min()
            .unwrap_or(0)
    }

    /// This node's own turns that are sent but not yet consumed.
    pub fn turns_in_transit(&self) -> usize {
        self.plr_self
            .map_or(0, |slot| self.players[slot.index()].turn_queue.len())
    }

    // -- Game setup --

    pub fn set_name(&mut self, slot: PlayerSlot, name: impl Into<String>) {
        self.names[slot.index()] = name.into();
    }

    pub fn name(&self, slot: PlayerSlot) -> &str {
        &self.names[slot.index()]
    }

    /// Names as published in a game announcement: empty for vacant slots.
    pub fn announced_names(&self) -> [&str; MAX_PLRS] {
        std::array::from_fn(|i| {
            if self.players[i].connected {
                self.names[i].as_str()
            } else {
                ""
            }
        })
    }

    pub fn set_game_init_info(&mut self, info: Vec<u8>) {
        self.game_init_info = info;
    }

    pub fn game_init_info(&self) -> &[u8] {
        &self.game_init_info
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u8) -> PlayerSlot {
        PlayerSlot::new(n).unwrap()
    }

    fn two_player_session() -> Session {
        let mut session = Session::new();
        session.set_self(slot(0));
        session.connect(slot(1));
        session
    }

    fn turn(seq: u32) -> Turn {
        Turn {
            seq,
            data: vec![seq as u8],
        }
    }

    // -- Connectivity --

    #[test]
    fn test_connect_new_slot_returns_true_once() {
        let mut session = Session::new();
        assert!(session.connect(slot(2)));
        assert!(!session.connect(slot(2)));
        assert!(session.is_connected(slot(2)));
    }

    #[test]
    fn test_disconnect_clears_queues_and_name() {
        let mut session = two_player_session();
        session.set_name(slot(1), "rogue");
        session.push_turn(slot(1), turn(1)).unwrap();
        session.push_message(slot(1), b"hi".to_vec());
        session.set_latency(slot(1), Duration::from_millis(5));

        assert!(session.disconnect(slot(1)));

        assert!(!session.is_connected(slot(1)));
        assert!(session.player(slot(1)).turn_queue.is_empty());
        assert_eq!(session.latency(slot(1)), None);
        assert_eq!(session.name(slot(1)), "");
        assert_eq!(session.pop_message(), None);
    }

    #[test]
    fn test_disconnect_vacant_slot_returns_false() {
        let mut session = Session::new();
        assert!(!session.disconnect(slot(3)));
    }

    #[test]
    fn test_connected_slots_ascending() {
        let mut session = Session::new();
        session.connect(slot(3));
        session.set_self(slot(1));
        let slots: Vec<u8> = session.connected_slots().map(PlayerSlot::get).collect();
        assert_eq!(slots, vec![1, 3]);
    }

    #[test]
    fn test_clear_game_keeps_setup() {
        let mut session = two_player_session();
        session.set_name(slot(0), "warrior");
        session.set_game_init_info(vec![1, 2, 3]);
        session.next_turn(vec![]).unwrap();

        session.clear_game();

        assert_eq!(session.plr_self(), None);
        assert_eq!(session.connected_slots().count(), 0);
        assert_eq!(session.game_init_info(), &[1, 2, 3]);
        assert_eq!(session.name(slot(0)), "warrior");
        // Sequence numbers restart with the next game.
        session.set_self(slot(0));
        assert_eq!(session.next_turn(vec![]).unwrap().seq, 1);
    }

    // -- Turns --

    #[test]
    fn test_next_turn_without_slot_returns_not_in_game() {
        let mut session = Session::new();
        assert!(matches!(
            session.next_turn(vec![1]),
            Err(SessionError::NotInGame)
        ));
    }

    #[test]
    fn test_next_turn_sequences_and_queues_locally() {
        let mut session = two_player_session();
        assert_eq!(session.next_turn(vec![]).unwrap().seq, 1);
        assert_eq!(session.next_turn(vec![]).unwrap().seq, 2);
        assert_eq!(session.turns_in_transit(), 2);
    }

    #[test]
    fn test_push_turn_from_vacant_slot_is_rejected() {
        let mut session = two_player_session();
        assert!(matches!(
            session.push_turn(slot(3), turn(1)),
            Err(SessionError::NotConnected(s)) if s == slot(3)
        ));
    }

    #[test]
    fn test_take_round_incomplete_consumes_nothing() {
        let mut session = two_player_session();
        session.next_turn(vec![7]).unwrap();

        let round = session.take_round();

        assert!(!round.is_complete());
        assert_eq!(round.status[0], TurnStatus::Arrived);
        assert_eq!(round.status[1], TurnStatus::Waiting);
        assert_eq!(round.status[2], TurnStatus::Vacant);
        assert_eq!(round.waiting_on().collect::<Vec<_>>(), vec![slot(1)]);
        assert_eq!(session.turns_in_transit(), 1);
    }

    #[test]
    fn test_take_round_complete_pops_one_per_slot() {
        let mut session = two_player_session();
        session.next_turn(vec![7]).unwrap();
        session.next_turn(vec![8]).unwrap();
        session.push_turn(slot(1), turn(1)).unwrap();

        let round = session.take_round();

        assert!(round.is_complete());
        assert_eq!(round.turns[0].as_ref().map(|t| t.data.clone()), Some(vec![7]));
        assert_eq!(round.turns[1], Some(turn(1)));
        assert_eq!(round.turns[2], None);
        assert_eq!(session.turns_in_transit(), 1);
        assert_eq!(session.owner_turns_waiting(), 0);
    }

    #[test]
    fn test_take_round_with_nobody_connected_is_incomplete() {
        let mut session = Session::new();
        assert!(!session.take_round().is_complete());
    }

    #[test]
    fn test_owner_turns_waiting_is_shortest_queue() {
        let mut session = two_player_session();
        for _ in 0..3 {
            session.next_turn(vec![]).unwrap();
        }
        session.push_turn(slot(1), turn(1)).unwrap();
        session.push_turn(slot(1), turn(2)).unwrap();
        assert_eq!(session.owner_turns_waiting(), 2);
    }

    // -- Setup --

    #[test]
    fn test_announced_names_blank_for_vacant_slots() {
        let mut session = two_player_session();
        session.set_name(slot(0), "warrior");
        session.set_name(slot(1), "rogue");
        session.set_name(slot(2), "ghost");

        assert_eq!(session.announced_names(), ["warrior", "rogue", "", ""]);
    }

    #[test]
    fn test_messages_are_fifo() {
        let mut session = two_player_session();
        session.push_message(slot(1), b"a".to_vec());
        session.push_message(slot(0), b"b".to_vec());
        assert_eq!(session.pop_message(), Some((slot(1), b"a".to_vec())));
        assert_eq!(session.pop_message(), Some((slot(0), b"b".to_vec())));
        assert_eq!(session.pop_message(), None);
    }
}
