//! Transport abstraction layer for crawlnet.
//!
//! Provides the [`Transport`] and [`Endpoint`] traits that abstract over
//! the network backend a game runs on. The protocol engine only ever talks
//! to these traits; one concrete adapter is injected per running game.
//!
//! The interface is poll-based on purpose: the engine is single-threaded
//! and drains inbound datagrams and disconnect notifications from inside
//! its own `poll()` call.
//!
//! # Adapters
//!
//! - [`LoopbackHub`] / [`LoopbackTransport`]: in-process mesh, used by
//!   tests and the local demo.
//! - `WebSocketTransport` (feature `websocket`, default): links over
//!   `tokio-tungstenite`.

mod error;
mod loopback;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use loopback::{Delivery, LoopbackEndpoint, LoopbackHub, LoopbackTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

use std::fmt;
use std::hash::Hash;

/// An address identifying a remote peer on some transport.
///
/// Endpoints travel inside `CONNECT` packets so that every member of a game
/// can learn every other member's address, hence the byte conversions.
pub trait Endpoint:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Serializes the address for transmission to another peer.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decodes an address previously produced by [`Endpoint::to_bytes`].
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidAddress`] if the bytes are malformed.
    fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError>;
}

/// Moves opaque byte buffers between endpoints.
///
/// All methods are non-blocking. Failures that concern a specific peer are
/// reported as disconnect notifications through
/// [`get_disconnected`](Transport::get_disconnected), so callers can treat
/// a send error as informational.
pub trait Transport: Send + 'static {
    /// The address type used by this transport.
    type Endpoint: Endpoint;

    /// Returns `true` once the underlying network is usable.
    fn network_online(&self) -> bool;

    /// Sends a datagram over the (possibly connection-oriented) link to
    /// `to`, opening the link if necessary.
    fn send(&mut self, to: &Self::Endpoint, data: &[u8]) -> Result<(), TransportError>;

    /// Sends an out-of-band datagram to a single endpoint. Used for
    /// discovery replies.
    fn send_oob(&mut self, to: &Self::Endpoint, data: &[u8]) -> Result<(), TransportError>;

    /// Sends an out-of-band datagram to every reachable node. Used for
    /// discovery requests.
    fn send_oob_mc(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Returns the next inbound datagram and its sender, if any is ready.
    fn recv(&mut self) -> Option<(Self::Endpoint, Vec<u8>)>;

    /// Returns the next endpoint whose link went down, if any.
    fn get_disconnected(&mut self) -> Option<Self::Endpoint>;

    /// Closes the link to `endpoint`. Unknown endpoints are ignored.
    fn disconnect(&mut self, endpoint: &Self::Endpoint);

    /// Returns `true` if a link to `endpoint` is currently established.
    fn is_peer_connected(&self, endpoint: &Self::Endpoint) -> bool;

    /// Produces a human-readable default name for a new game.
    fn make_default_gamename(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_endpoint_bytes_roundtrip() {
        let ep = LoopbackEndpoint::new(42);
        let decoded = LoopbackEndpoint::from_bytes(&ep.to_bytes()).unwrap();
        assert_eq!(decoded, ep);
    }

    #[test]
    fn test_loopback_endpoint_display() {
        assert_eq!(LoopbackEndpoint::new(7).to_string(), "loop-7");
    }

    #[test]
    fn test_loopback_endpoint_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(LoopbackEndpoint::new(1), "host");
        map.insert(LoopbackEndpoint::new(2), "guest");
        assert_eq!(map[&LoopbackEndpoint::new(1)], "host");
    }

    #[test]
    fn test_loopback_endpoint_rejects_short_bytes() {
        let result = LoopbackEndpoint::from_bytes(&[1, 2, 3]);
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }
}
