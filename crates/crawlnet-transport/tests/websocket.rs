//! Integration tests for the WebSocket transport.
//!
//! These bind real listeners on ephemeral ports and move bytes between two
//! transports in the same process. The transport API is synchronous, so
//! the tests poll with a short sleep until data shows up.

#[cfg(feature = "websocket")]
mod websocket {
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    use crawlnet_transport::{Transport, WebSocketConfig, WebSocketTransport};

    fn bind(seeds: Vec<SocketAddr>) -> WebSocketTransport {
        WebSocketTransport::bind(WebSocketConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            seeds,
            ..WebSocketConfig::default()
        })
        .expect("should bind")
    }

    /// Polls `f` until it yields a value or two seconds pass.
    fn eventually<T>(mut f: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(value) = f() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out waiting");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_websocket_send_and_reply_use_listen_addresses() {
        let mut a = bind(Vec::new());
        let mut b = bind(Vec::new());
        let a_addr = a.local_addr();
        let b_addr = b.local_addr();

        a.send(&b_addr, b"hello from a").expect("send should succeed");
        let (from, data) = eventually(|| b.recv());
        assert_eq!(from, a_addr, "accepted link is keyed by listen address");
        assert_eq!(data, b"hello from a");

        b.send(&a_addr, b"hello from b").expect("send should succeed");
        let (from, data) = eventually(|| a.recv());
        assert_eq!(from, b_addr);
        assert_eq!(data, b"hello from b");

        assert!(a.is_peer_connected(&b_addr));
        assert!(b.is_peer_connected(&a_addr));
    }

    #[test]
    fn test_websocket_preserves_order() {
        let mut a = bind(Vec::new());
        let mut b = bind(Vec::new());
        let b_addr = b.local_addr();

        for i in 0u8..20 {
            a.send(&b_addr, &[i]).unwrap();
        }
        let received: Vec<u8> = (0..20).map(|_| eventually(|| b.recv()).1[0]).collect();
        assert_eq!(received, (0u8..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_websocket_oob_mc_reaches_seeds() {
        let mut host = bind(Vec::new());
        let mut guest = bind(vec![host.local_addr()]);

        guest.send_oob_mc(b"info request").unwrap();

        let (from, data) = eventually(|| host.recv());
        assert_eq!(from, guest.local_addr());
        assert_eq!(data, b"info request");
    }

    #[test]
    fn test_websocket_disconnect_notifies_remote() {
        let mut a = bind(Vec::new());
        let mut b = bind(Vec::new());
        let a_addr = a.local_addr();
        let b_addr = b.local_addr();

        a.send(&b_addr, b"x").unwrap();
        eventually(|| b.recv());

        a.disconnect(&b_addr);

        let gone = eventually(|| b.get_disconnected());
        assert_eq!(gone, a_addr);
        assert!(!a.is_peer_connected(&b_addr));
        assert_eq!(a.get_disconnected(), None, "local close is not reported");
    }

    #[test]
    fn test_websocket_dial_failure_reports_disconnect() {
        let mut a = bind(Vec::new());
        // Bind and drop to get a port nobody listens on.
        let dead = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        a.send(&dead, b"anyone?").unwrap();

        assert_eq!(eventually(|| a.get_disconnected()), dead);
    }
}
