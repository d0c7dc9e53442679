//! The receive pump and control-packet handlers.

use crawlnet_protocol::{Address, Cookie, GameAnnouncement, LeaveReason, Packet, PacketBody, PlayerSlot};
use crawlnet_session::Event;
use crawlnet_transport::{Endpoint, Transport};
use tracing::{debug, info, trace, warn};

use super::peer::{GameListEntry, Peer};
use super::ProtocolEngine;
use crate::CrawlnetError;

impl<T: Transport> ProtocolEngine<T> {
    /// Drains every ready datagram, then every disconnect notification.
    ///
    /// A buffer that fails to parse or authenticate, or whose handling
    /// fails, costs the sender its link. Nothing here is surfaced to the
    /// caller.
    pub(super) fn recv(&mut self) {
        while let Some((sender, buf)) = self.transport.recv() {
            let result = self
                .factory
                .parse(&buf)
                .map_err(CrawlnetError::from)
                .and_then(|packet| self.dispatch(packet, sender.clone()));
            if let Err(e) = result {
                warn!(peer = %sender, error = %e, "dropping packet and disconnecting sender");
                self.disconnect_endpoint(&sender);
            }
        }
        while let Some(endpoint) = self.transport.get_disconnected() {
            self.on_link_lost(&endpoint);
        }
    }

    /// Routes a parsed packet by `(source, destination, body)`.
    fn dispatch(&mut self, packet: Packet, sender: T::Endpoint) -> Result<(), CrawlnetError> {
        trace!(
            peer = %sender,
            kind = %packet.packet_type(),
            src = %packet.source(),
            dst = %packet.destination(),
            "packet received"
        );
        match (packet.source(), packet.destination(), packet.body()) {
            (Address::Broadcast, Address::Master, PacketBody::InfoReply { info }) => {
                self.handle_info_reply(info, sender);
                Ok(())
            }
            (Address::Broadcast, Address::Master, PacketBody::JoinRequest { cookie, .. }) => {
                self.handle_join_request(*cookie, sender)
            }
            (Address::Broadcast, Address::Master, PacketBody::InfoRequest) => {
                self.handle_info_request(sender)
            }
            (Address::Master, _, PacketBody::Connect { new_player, address }) => {
                self.handle_connect(*new_player, address, sender)
            }
            (Address::Player(raw), _, _) => match PlayerSlot::new(raw) {
                Some(source) => self.recv_ingame(source, &packet, sender),
                None => {
                    debug!(peer = %sender, source = raw, "packet source out of range");
                    Ok(())
                }
            },
            (Address::Broadcast | Address::Master, _, body) => {
                debug!(peer = %sender, kind = %body.packet_type(), "unexpected control packet");
                Ok(())
            }
        }
    }

    // -- Discovery --

    fn handle_info_reply(&mut self, info: &[u8], sender: T::Endpoint) {
        let announcement = match GameAnnouncement::decode(info) {
            Ok(announcement) => announcement,
            Err(e) => {
                debug!(peer = %sender, error = %e, "ignoring game announcement");
                return;
            }
        };
        trace!(game = %announcement.game_name, peer = %sender, "game announced");
        self.game_list.insert(
            announcement.game_name,
            GameListEntry {
                game_data: announcement.game_data,
                player_names: announcement.player_names,
                endpoint: sender,
            },
        );
    }

    fn handle_info_request(&mut self, sender: T::Endpoint) -> Result<(), CrawlnetError> {
        let Some(me) = self.session.plr_self() else {
            return Ok(());
        };
        if self.master() != Some(me) {
            return Ok(());
        }
        let info = GameAnnouncement::encode(
            self.session.game_init_info(),
            &self.session.announced_names(),
            &self.game_name,
        );
        let reply = self.factory.make_packet(
            Address::Broadcast,
            Address::Master,
            PacketBody::InfoReply { info },
        )?;
        if let Err(e) = self.transport.send_oob(&sender, reply.data()) {
            debug!(peer = %sender, error = %e, "announcement not delivered");
        }
        Ok(())
    }

    // -- Joining --

    /// Gives the sender the lowest free slot and introduces it to the mesh.
    fn handle_join_request(&mut self, cookie: Cookie, sender: T::Endpoint) -> Result<(), CrawlnetError> {
        let Some(me) = self.session.plr_self() else {
            debug!(peer = %sender, "join request while not in a game");
            return Ok(());
        };
        if self.slot_of(&sender).is_some() {
            debug!(peer = %sender, "duplicate join request");
            return Ok(());
        }
        let Some(new_slot) = PlayerSlot::all()
            .find(|slot| *slot != me && self.peers[slot.index()].endpoint.is_none())
        else {
            debug!(peer = %sender, "game full, join request ignored");
            return Ok(());
        };

        self.peers[new_slot.index()] = Peer::pending(sender.clone());
        self.connect_slot(new_slot);

        let sender_address = sender.to_bytes();
        for slot in PlayerSlot::all() {
            if slot == me || slot == new_slot {
                continue;
            }
            let Some(member) = self.peers[slot.index()].endpoint.clone() else {
                continue;
            };
            let to_member = self.factory.make_packet(
                Address::Master,
                Address::Broadcast,
                PacketBody::Connect {
                    new_player: new_slot,
                    address: sender_address.clone(),
                },
            )?;
            self.transmit(&member, &to_member);
            let to_joiner = self.factory.make_packet(
                Address::Master,
                Address::Broadcast,
                PacketBody::Connect {
                    new_player: slot,
                    address: member.to_bytes(),
                },
            )?;
            self.transmit(&sender, &to_joiner);
        }

        // Sent last: the joiner must know every member before it starts.
        let accept = self.factory.make_packet(
            me,
            Address::Broadcast,
            PacketBody::JoinAccept {
                cookie,
                new_player: new_slot,
                info: self.session.game_init_info().to_vec(),
            },
        )?;
        self.transmit(&sender, &accept);
        self.drain_send_queue(new_slot);

        info!(slot = %new_slot, peer = %sender, "player joined");
        Ok(())
    }

    /// Learns a member's address from the host.
    fn handle_connect(
        &mut self,
        new_player: PlayerSlot,
        address: &[u8],
        sender: T::Endpoint,
    ) -> Result<(), CrawlnetError> {
        if !self.is_recognized(&sender) {
            debug!(peer = %sender, "CONNECT from unrecognized endpoint");
            return Ok(());
        }
        if Some(new_player) == self.session.plr_self() {
            debug!(slot = %new_player, "CONNECT names our own slot");
            return Ok(());
        }
        let endpoint = T::Endpoint::from_bytes(address)?;
        match self.slot_of(&endpoint) {
            Some(slot) if slot == new_player => {
                trace!(%slot, "duplicate CONNECT");
                return Ok(());
            }
            Some(slot) => {
                debug!(%slot, claimed = %new_player, peer = %endpoint, "CONNECT for endpoint held by another slot");
                return Ok(());
            }
            None => {}
        }

        if let Some(previous) = &self.peers[new_player.index()].endpoint {
            info!(slot = %new_player, old = %previous, new = %endpoint, "slot reassigned by host");
            self.remove_player(new_player, LeaveReason::Drop);
        }

        self.peers[new_player.index()] = Peer::pending(endpoint);
        self.connect_slot(new_player);
        if self.session.plr_self().is_some() {
            self.initiate_handshake(new_player)?;
        }
        Ok(())
    }

    // -- In-game traffic --

    fn recv_ingame(
        &mut self,
        source: PlayerSlot,
        packet: &Packet,
        sender: T::Endpoint,
    ) -> Result<(), CrawlnetError> {
        if self.is_expected_accept(packet, &sender) {
            self.peers[source.index()] = Peer::confirmed(sender);
            self.connect_slot(source);
            self.first_peer = None;
        } else if self.peers[source.index()].endpoint.as_ref() != Some(&sender) {
            debug!(peer = %sender, %source, "packet source does not match sender");
            return Ok(());
        }

        let for_us = match packet.destination() {
            Address::Broadcast => true,
            dst => self.session.plr_self().is_some_and(|me| dst == Address::from(me)),
        };
        if !for_us {
            trace!(%source, dst = %packet.destination(), "packet not for us");
            return Ok(());
        }

        let was_unjoined = self.session.plr_self().is_none();
        self.recv_local(source, packet)?;

        if self.session.plr_self().is_some() {
            if was_unjoined {
                // Members learned about us from the host; now we can reach them.
                for slot in PlayerSlot::all() {
                    self.initiate_handshake(slot)?;
                }
            }
            // Hearing from a peer proves it is reachable.
            self.drain_send_queue(source);
        }
        Ok(())
    }

    fn is_expected_accept(&self, packet: &Packet, sender: &T::Endpoint) -> bool {
        self.first_peer.as_ref() == Some(sender)
            && matches!(
                packet.body(),
                PacketBody::JoinAccept { cookie, .. } if Some(*cookie) == self.cookie_self
            )
    }

    // -- Peer table --

    /// The slot whose peer entry holds `endpoint`.
    pub(super) fn slot_of(&self, endpoint: &T::Endpoint) -> Option<PlayerSlot> {
        PlayerSlot::all().find(|slot| self.peers[slot.index()].endpoint.as_ref() == Some(endpoint))
    }

    fn is_recognized(&self, sender: &T::Endpoint) -> bool {
        self.first_peer.as_ref() == Some(sender) || self.slot_of(sender).is_some()
    }

    /// Closes the link to `endpoint` and forgets whichever slot held it.
    pub(super) fn disconnect_endpoint(&mut self, endpoint: &T::Endpoint) {
        self.transport.disconnect(endpoint);
        self.on_link_lost(endpoint);
    }

    /// Resets the slot that held `endpoint`. Every other slot is untouched.
    fn on_link_lost(&mut self, endpoint: &T::Endpoint) {
        if self.first_peer.as_ref() == Some(endpoint) {
            debug!(peer = %endpoint, "lost link to joining host");
            self.first_peer = None;
        }
        let Some(slot) = self.slot_of(endpoint) else {
            return;
        };
        self.peers[slot.index()] = Peer::default();
        if self.session.disconnect(slot) {
            info!(%slot, peer = %endpoint, "player disconnected");
            self.events.fire(&Event::leave(slot, LeaveReason::Drop));
        }
    }
}
