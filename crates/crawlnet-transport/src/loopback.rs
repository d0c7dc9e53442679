//! In-process transport: every node lives in the same process and shares a
//! [`LoopbackHub`].
//!
//! The hub behaves like a lossless, ordered network with connection-style
//! links. A link between two nodes counts as established as soon as either
//! side has sent a regular datagram to the other, which mirrors how the
//! first packet on a stream transport opens the connection. Out-of-band
//! traffic never establishes a link.
//!
//! The hub also exposes the knobs tests need: raw datagram injection,
//! forced link severing and per-node connectivity. A hub built with
//! [`LoopbackHub::recording`] additionally keeps a log of every transmitted
//! datagram; a plain hub keeps nothing once a datagram is received.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use crate::{Endpoint, Transport, TransportError};

/// Address of a node attached to a [`LoopbackHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopbackEndpoint(u64);

impl LoopbackEndpoint {
    /// Creates an endpoint from a raw node id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LoopbackEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

impl Endpoint for LoopbackEndpoint {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| {
            TransportError::InvalidAddress(format!(
                "expected 8 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(u64::from_le_bytes(raw)))
    }
}

/// One datagram that crossed the hub, as recorded in the delivery log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: LoopbackEndpoint,
    pub to: LoopbackEndpoint,
    pub data: Vec<u8>,
    pub out_of_band: bool,
}

#[derive(Debug)]
struct Node {
    online: bool,
    inbox: VecDeque<(LoopbackEndpoint, Vec<u8>)>,
    disconnected: VecDeque<LoopbackEndpoint>,
}

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    nodes: HashMap<LoopbackEndpoint, Node>,
    /// Established links, stored with the smaller endpoint first.
    links: HashSet<(LoopbackEndpoint, LoopbackEndpoint)>,
    /// Only `Some` on a recording hub.
    log: Option<Vec<Delivery>>,
}

fn link_key(
    a: LoopbackEndpoint,
    b: LoopbackEndpoint,
) -> (LoopbackEndpoint, LoopbackEndpoint) {
    if a <= b { (a, b) } else { (b, a) }
}

impl HubState {
    fn deliver(
        &mut self,
        from: LoopbackEndpoint,
        to: LoopbackEndpoint,
        data: &[u8],
        out_of_band: bool,
    ) -> Result<(), TransportError> {
        if !self.nodes.get(&from).is_some_and(|n| n.online) {
            return Err(TransportError::Offline);
        }
        let node = self
            .nodes
            .get_mut(&to)
            .filter(|n| n.online)
            .ok_or_else(|| TransportError::Unreachable(to.to_string()))?;
        node.inbox.push_back((from, data.to_vec()));
        if !out_of_band {
            self.links.insert(link_key(from, to));
        }
        if let Some(log) = &mut self.log {
            log.push(Delivery {
                from,
                to,
                data: data.to_vec(),
                out_of_band,
            });
        }
        Ok(())
    }

    /// Removes the link and tells `notified` that `gone` went away.
    fn sever(&mut self, gone: LoopbackEndpoint, notified: LoopbackEndpoint) -> bool {
        if !self.links.remove(&link_key(gone, notified)) {
            return false;
        }
        if let Some(node) = self.nodes.get_mut(&notified) {
            node.disconnected.push_back(gone);
        }
        true
    }
}

/// Shared in-process network. Cheap to clone; all clones see the same nodes.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty hub that logs every datagram it carries, for
    /// inspection with [`deliveries`](Self::deliveries).
    pub fn recording() -> Self {
        let hub = Self::default();
        hub.lock().log = Some(Vec::new());
        hub
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches a new, online node to the hub.
    pub fn transport(&self) -> LoopbackTransport {
        let mut state = self.lock();
        state.next_id += 1;
        let local = LoopbackEndpoint(state.next_id);
        state.nodes.insert(
            local,
            Node {
                online: true,
                inbox: VecDeque::new(),
                disconnected: VecDeque::new(),
            },
        );
        tracing::debug!(%local, "loopback node attached");
        LoopbackTransport {
            local,
            hub: self.clone(),
        }
    }

    /// Marks a node as online or offline. Offline nodes neither send nor
    /// receive.
    pub fn set_online(&self, endpoint: LoopbackEndpoint, online: bool) {
        if let Some(node) = self.lock().nodes.get_mut(&endpoint) {
            node.online = online;
        }
    }

    /// Returns a copy of every datagram transmitted so far, in order.
    /// Always empty unless the hub was built with
    /// [`recording`](Self::recording).
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().log.clone().unwrap_or_default()
    }

    /// Forgets the delivery log.
    pub fn clear_deliveries(&self) {
        if let Some(log) = &mut self.lock().log {
            log.clear();
        }
    }

    /// Places a raw datagram in `to`'s inbox as if `from` had sent it.
    /// Bypasses the link bookkeeping and the delivery log.
    pub fn inject(&self, from: LoopbackEndpoint, to: LoopbackEndpoint, data: &[u8]) {
        if let Some(node) = self.lock().nodes.get_mut(&to) {
            node.inbox.push_back((from, data.to_vec()));
        }
    }

    /// Breaks the link between `a` and `b`; both sides receive a
    /// disconnect notification.
    pub fn sever(&self, a: LoopbackEndpoint, b: LoopbackEndpoint) {
        let mut state = self.lock();
        if state.links.contains(&link_key(a, b)) {
            state.sever(a, b);
            if let Some(node) = state.nodes.get_mut(&a) {
                node.disconnected.push_back(b);
            }
        }
    }

    /// Returns `true` if a link between `a` and `b` is established.
    pub fn is_linked(&self, a: LoopbackEndpoint, b: LoopbackEndpoint) -> bool {
        self.lock().links.contains(&link_key(a, b))
    }
}

/// A node on a [`LoopbackHub`].
///
/// Dropping the transport detaches the node; every peer it had a link with
/// receives a disconnect notification.
#[derive(Debug)]
pub struct LoopbackTransport {
    local: LoopbackEndpoint,
    hub: LoopbackHub,
}

impl LoopbackTransport {
    /// Returns the address other nodes use to reach this one.
    pub fn local_endpoint(&self) -> LoopbackEndpoint {
        self.local
    }

    /// Returns the hub this node is attached to.
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    type Endpoint = LoopbackEndpoint;

    fn network_online(&self) -> bool {
        self.hub
            .lock()
            .nodes
            .get(&self.local)
            .is_some_and(|n| n.online)
    }

    fn send(&mut self, to: &LoopbackEndpoint, data: &[u8]) -> Result<(), TransportError> {
        self.hub.lock().deliver(self.local, *to, data, false)
    }

    fn send_oob(&mut self, to: &LoopbackEndpoint, data: &[u8]) -> Result<(), TransportError> {
        self.hub.lock().deliver(self.local, *to, data, true)
    }

    fn send_oob_mc(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        let targets: Vec<LoopbackEndpoint> = state
            .nodes
            .iter()
            .filter(|(ep, node)| **ep != self.local && node.online)
            .map(|(ep, _)| *ep)
            .collect();
        for to in targets {
            state.deliver(self.local, to, data, true)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> Option<(LoopbackEndpoint, Vec<u8>)> {
        let mut state = self.hub.lock();
        let node = state.nodes.get_mut(&self.local)?;
        if !node.online {
            return None;
        }
        node.inbox.pop_front()
    }

    fn get_disconnected(&mut self) -> Option<LoopbackEndpoint> {
        self.hub
            .lock()
            .nodes
            .get_mut(&self.local)?
            .disconnected
            .pop_front()
    }

    fn disconnect(&mut self, endpoint: &LoopbackEndpoint) {
        if self.hub.lock().sever(self.local, *endpoint) {
            tracing::debug!(local = %self.local, peer = %endpoint, "loopback link closed");
        }
    }

    fn is_peer_connected(&self, endpoint: &LoopbackEndpoint) -> bool {
        self.hub.is_linked(self.local, *endpoint)
    }

    fn make_default_gamename(&self) -> String {
        let mut rng = rand::rng();
        (0..5)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let mut state = self.hub.lock();
        let linked: Vec<LoopbackEndpoint> = state
            .links
            .iter()
            .filter_map(|&(a, b)| match (a == self.local, b == self.local) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect();
        for peer in linked {
            state.sever(self.local, peer);
        }
        state.nodes.remove(&self.local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_delivers_in_order_and_opens_link() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let mut b = hub.transport();
        let a_ep = a.local_endpoint();
        let b_ep = b.local_endpoint();

        assert!(!a.is_peer_connected(&b_ep));
        a.send(&b_ep, b"one").unwrap();
        a.send(&b_ep, b"two").unwrap();

        assert!(a.is_peer_connected(&b_ep));
        assert!(b.is_peer_connected(&a_ep));
        assert_eq!(b.recv(), Some((a_ep, b"one".to_vec())));
        assert_eq!(b.recv(), Some((a_ep, b"two".to_vec())));
        assert_eq!(b.recv(), None);
    }

    #[test]
    fn test_send_oob_does_not_open_link() {
        let hub = LoopbackHub::recording();
        let mut a = hub.transport();
        let b = hub.transport();

        a.send_oob(&b.local_endpoint(), b"hello").unwrap();

        assert!(!a.is_peer_connected(&b.local_endpoint()));
        assert!(hub.deliveries()[0].out_of_band);
    }

    #[test]
    fn test_send_oob_mc_reaches_every_other_online_node() {
        let hub = LoopbackHub::recording();
        let mut a = hub.transport();
        let mut b = hub.transport();
        let mut c = hub.transport();
        let d = hub.transport();
        hub.set_online(d.local_endpoint(), false);

        a.send_oob_mc(b"who is there").unwrap();

        assert!(b.recv().is_some());
        assert!(c.recv().is_some());
        assert!(a.recv().is_none());
        assert_eq!(hub.deliveries().len(), 2);
    }

    #[test]
    fn test_send_to_offline_node_is_unreachable() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let b = hub.transport();
        hub.set_online(b.local_endpoint(), false);

        let result = a.send(&b.local_endpoint(), b"x");
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }

    #[test]
    fn test_offline_node_cannot_send() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let b = hub.transport();
        hub.set_online(a.local_endpoint(), false);

        assert!(!a.network_online());
        let result = a.send(&b.local_endpoint(), b"x");
        assert!(matches!(result, Err(TransportError::Offline)));
    }

    #[test]
    fn test_disconnect_notifies_remote_side_only() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let mut b = hub.transport();
        a.send(&b.local_endpoint(), b"x").unwrap();

        a.disconnect(&b.local_endpoint());

        assert!(!a.is_peer_connected(&b.local_endpoint()));
        assert_eq!(b.get_disconnected(), Some(a.local_endpoint()));
        assert_eq!(a.get_disconnected(), None);
    }

    #[test]
    fn test_sever_notifies_both_sides() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let mut b = hub.transport();
        a.send(&b.local_endpoint(), b"x").unwrap();

        hub.sever(a.local_endpoint(), b.local_endpoint());

        assert_eq!(a.get_disconnected(), Some(b.local_endpoint()));
        assert_eq!(b.get_disconnected(), Some(a.local_endpoint()));
    }

    #[test]
    fn test_drop_detaches_node_and_notifies_peers() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let b = hub.transport();
        let b_ep = b.local_endpoint();
        a.send(&b_ep, b"x").unwrap();

        drop(b);

        assert_eq!(a.get_disconnected(), Some(b_ep));
        assert!(matches!(
            a.send(&b_ep, b"y"),
            Err(TransportError::Unreachable(_))
        ));
    }

    #[test]
    fn test_inject_bypasses_log() {
        let hub = LoopbackHub::recording();
        let a = hub.transport();
        let mut b = hub.transport();

        hub.inject(a.local_endpoint(), b.local_endpoint(), b"garbage");

        assert_eq!(b.recv(), Some((a.local_endpoint(), b"garbage".to_vec())));
        assert!(hub.deliveries().is_empty());
    }

    #[test]
    fn test_deliveries_plain_hub_keeps_no_log() {
        let hub = LoopbackHub::new();
        let mut a = hub.transport();
        let mut b = hub.transport();

        for _ in 0..100 {
            a.send(&b.local_endpoint(), b"turn").unwrap();
            b.recv().unwrap();
        }

        assert!(hub.deliveries().is_empty());
        assert!(hub.lock().log.is_none());
    }

    #[test]
    fn test_clear_deliveries_empties_recording_log() {
        let hub = LoopbackHub::recording();
        let mut a = hub.transport();
        let b = hub.transport();
        a.send(&b.local_endpoint(), b"x").unwrap();
        assert_eq!(hub.deliveries().len(), 1);

        hub.clear_deliveries();
        a.send(&b.local_endpoint(), b"y").unwrap();

        let log = hub.deliveries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data, b"y");
    }

    #[test]
    fn test_default_gamename_is_five_lowercase_letters() {
        let hub = LoopbackHub::new();
        let a = hub.transport();
        let name = a.make_default_gamename();
        assert_eq!(name.len(), 5);
        assert!(name.chars().all(|c| c.is_ascii_lowercase()));
    }
}
