//! Local delivery, the send path, and leaving.

use crawlnet_protocol::{Address, LeaveReason, Packet, PacketBody, PlayerSlot};
use crawlnet_session::Event;
use crawlnet_transport::Transport;
use tracing::{debug, info, trace, warn};

use super::{EngineState, ProtocolEngine, echo_latency};
use crate::CrawlnetError;

impl<T: Transport> ProtocolEngine<T> {
    /// Applies an in-game packet from `source` to this node.
    pub(super) fn recv_local(&mut self, source: PlayerSlot, packet: &Packet) -> Result<(), CrawlnetError> {
        match packet.body() {
            PacketBody::Message { message } => {
                self.session.push_message(source, message.clone());
            }
            PacketBody::Turn { turn } => {
                if let Err(e) = self.session.push_turn(source, turn.clone()) {
                    debug!(%source, seq = turn.seq, error = %e, "turn dropped");
                }
            }
            PacketBody::JoinAccept {
                cookie,
                new_player,
                info,
            } => {
                if self.session.plr_self().is_some() || Some(*cookie) != self.cookie_self {
                    debug!(%source, "unexpected JOIN_ACCEPT");
                    return Ok(());
                }
                self.session.set_game_init_info(info.clone());
                self.connect_slot(*new_player);
                self.session.set_self(*new_player);
                self.cookie_self = None;
                self.state = EngineState::Connected;
                self.events
                    .fire(&Event::create_game(*new_player, info.clone()));
            }
            PacketBody::Disconnect { new_player, reason } => {
                if Some(*new_player) == self.session.plr_self() {
                    info!(%source, ?reason, "dropped from game");
                    self.events.fire(&Event::leave(*new_player, *reason));
                    self.abandon_game();
                } else {
                    self.remove_player(*new_player, *reason);
                }
            }
            PacketBody::EchoRequest { time } => {
                let Some(me) = self.session.plr_self() else {
                    return Ok(());
                };
                let reply =
                    self.factory
                        .make_packet(me, source, PacketBody::EchoReply { time: *time })?;
                self.send(&reply)?;
            }
            PacketBody::EchoReply { time } => {
                let latency = echo_latency(self.now_ms(), *time);
                trace!(%source, ?latency, "echo reply");
                self.session.set_latency(source, latency);
            }
            PacketBody::JoinRequest { .. }
            | PacketBody::Connect { .. }
            | PacketBody::InfoRequest
            | PacketBody::InfoReply { .. } => {
                debug!(%source, kind = %packet.packet_type(), "control packet from a player slot");
            }
        }
        Ok(())
    }

    // -- Send path --

    /// Routes an outbound packet by its destination.
    ///
    /// # Errors
    /// [`CrawlnetError::IllegalDestination`] for `MASTER` or an
    /// out-of-range player.
    pub(super) fn send(&mut self, packet: &Packet) -> Result<(), CrawlnetError> {
        match packet.destination() {
            Address::Player(raw) => {
                let slot = PlayerSlot::new(raw).ok_or(CrawlnetError::IllegalDestination)?;
                if Some(slot) != self.session.plr_self() {
                    self.send_to(slot, packet);
                }
            }
            Address::Broadcast => {
                for slot in PlayerSlot::all() {
                    self.send_to(slot, packet);
                }
            }
            Address::Master => return Err(CrawlnetError::IllegalDestination),
        }
        Ok(())
    }

    /// Sends to one slot, or queues while its handshake is pending. Echo
    /// packets are never queued.
    fn send_to(&mut self, slot: PlayerSlot, packet: &Packet) {
        let max_pending = self.config.max_pending_per_peer;
        let peer = &mut self.peers[slot.index()];
        let Some(endpoint) = peer.endpoint.clone() else {
            return;
        };
        let queued = match &mut peer.send_queue {
            Some(queue) if !packet.is_echo() => {
                queue.push_back(packet.clone());
                if queue.len() > max_pending {
                    warn!(%slot, pending = queue.len(), "send queue over soft cap");
                }
                true
            }
            _ => false,
        };
        if !queued {
            self.transmit(&endpoint, packet);
        }
    }

    /// Flushes everything queued for `slot` in order and switches it to
    /// direct sends.
    pub(super) fn drain_send_queue(&mut self, slot: PlayerSlot) {
        let peer = &mut self.peers[slot.index()];
        let Some(queue) = peer.send_queue.take() else {
            return;
        };
        let Some(endpoint) = peer.endpoint.clone() else {
            return;
        };
        if !queue.is_empty() {
            debug!(%slot, count = queue.len(), "draining send queue");
        }
        for packet in &queue {
            self.transmit(&endpoint, packet);
        }
    }

    /// Sends an echo request to `slot` if this side should open the link.
    pub(super) fn initiate_handshake(&mut self, slot: PlayerSlot) -> Result<(), CrawlnetError> {
        let Some(me) = self.session.plr_self() else {
            return Ok(());
        };
        let Some(endpoint) = self.peers[slot.index()].endpoint.as_ref() else {
            return Ok(());
        };
        // Opening a link from both ends at once is unsafe on
        // connection-oriented transports, so the lower slot goes first.
        if me < slot || self.transport.is_peer_connected(endpoint) {
            let request = self.factory.make_packet(
                me,
                slot,
                PacketBody::EchoRequest {
                    time: self.now_ms(),
                },
            )?;
            self.send(&request)?;
        }
        Ok(())
    }

    // -- Leaving --

    pub(super) fn leave(&mut self, reason: LeaveReason) -> Result<(), CrawlnetError> {
        let Some(me) = self.session.plr_self() else {
            self.abandon_game();
            return Ok(());
        };
        for slot in PlayerSlot::all() {
            self.drain_send_queue(slot);
        }
        let farewell = self.factory.make_packet(
            me,
            Address::Broadcast,
            PacketBody::Disconnect {
                new_player: me,
                reason,
            },
        )?;
        self.send(&farewell)?;
        self.recv();
        info!(slot = %me, ?reason, "left game");
        self.abandon_game();
        Ok(())
    }

    pub(super) fn drop_slot(&mut self, slot: PlayerSlot, reason: LeaveReason) -> Result<(), CrawlnetError> {
        let me = self.require_slot()?;
        if slot == me {
            return self.leave(reason);
        }
        if !self.session.is_connected(slot) {
            return Err(crawlnet_session::SessionError::NotConnected(slot).into());
        }
        let notice = self.factory.make_packet(
            me,
            Address::Broadcast,
            PacketBody::Disconnect {
                new_player: slot,
                reason,
            },
        )?;
        self.send(&notice)?;
        self.remove_player(slot, reason);
        Ok(())
    }

    /// Tears down `slot` after it left or was dropped.
    pub(super) fn remove_player(&mut self, slot: PlayerSlot, reason: LeaveReason) {
        let peer = std::mem::take(&mut self.peers[slot.index()]);
        if let Some(endpoint) = peer.endpoint {
            self.transport.disconnect(&endpoint);
        }
        if self.session.disconnect(slot) {
            info!(%slot, ?reason, "player left");
            self.events.fire(&Event::leave(slot, reason));
        }
    }
}
