//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The transport owns a small Tokio runtime. A listener task accepts
//! incoming links and one task per link pumps frames in both directions.
//! The synchronous [`Transport`] side only touches channels, so the engine
//! never blocks on the network.
//!
//! Links are keyed by the *listen* address of the remote node: the dialing
//! side announces its own listen address in a first text frame. That way an
//! address learned from a `CONNECT` packet and the key of an accepted link
//! are the same value.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Endpoint, Transport, TransportError};

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

impl Endpoint for SocketAddr {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                TransportError::InvalidAddress(
                    String::from_utf8_lossy(bytes).into_owned(),
                )
            })
    }
}

/// Settings for [`WebSocketTransport::bind`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address the listener binds to.
    pub listen: SocketAddr,
    /// Address announced to peers. Defaults to the bound address, which is
    /// only dialable if `listen` is not a wildcard address.
    pub advertise: Option<SocketAddr>,
    /// Nodes that receive out-of-band discovery broadcasts.
    pub seeds: Vec<SocketAddr>,
    /// How long a dial may take before the link is reported as down.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 6112)),
            advertise: None,
            seeds: Vec::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    established: bool,
}

type SharedLinks = Arc<Mutex<HashMap<SocketAddr, Link>>>;

fn lock(links: &SharedLinks) -> MutexGuard<'_, HashMap<SocketAddr, Link>> {
    links.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channels from the link tasks back to the synchronous side.
#[derive(Clone)]
struct Events {
    data: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
    closed: mpsc::UnboundedSender<SocketAddr>,
}

/// A [`Transport`] whose links are WebSocket connections.
pub struct WebSocketTransport {
    runtime: Runtime,
    advertise: SocketAddr,
    seeds: Vec<SocketAddr>,
    connect_timeout: Duration,
    links: SharedLinks,
    events: Events,
    data_rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
    closed_rx: mpsc::UnboundedReceiver<SocketAddr>,
}

impl WebSocketTransport {
    /// Binds the listener and starts accepting links.
    pub fn bind(config: WebSocketConfig) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(TransportError::BindFailed)?;
        let listener = runtime
            .block_on(TcpListener::bind(config.listen))
            .map_err(TransportError::BindFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::BindFailed)?;
        let advertise = config.advertise.unwrap_or(local_addr);

        let links = SharedLinks::default();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let events = Events {
            data: data_tx,
            closed: closed_tx,
        };

        runtime.spawn(accept_loop(listener, Arc::clone(&links), events.clone()));
        tracing::info!(%local_addr, %advertise, "WebSocket transport listening");

        Ok(Self {
            runtime,
            advertise,
            seeds: config.seeds,
            connect_timeout: config.connect_timeout,
            links,
            events,
            data_rx,
            closed_rx,
        })
    }

    /// Returns the address announced to peers.
    pub fn local_addr(&self) -> SocketAddr {
        self.advertise
    }

    /// Returns the outbound channel for `to`, dialing a new link if none
    /// exists yet. Frames queued before the dial completes are sent in
    /// order once it does.
    fn outbound(&self, to: SocketAddr) -> mpsc::UnboundedSender<Vec<u8>> {
        let mut links = lock(&self.links);
        if let Some(link) = links.get(&to) {
            return link.outbound.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed);
        links.insert(
            to,
            Link {
                id,
                outbound: tx.clone(),
                established: false,
            },
        );
        self.runtime.spawn(dial(
            to,
            self.advertise,
            id,
            rx,
            Arc::clone(&self.links),
            self.events.clone(),
            self.connect_timeout,
        ));
        tx
    }
}

impl Transport for WebSocketTransport {
    type Endpoint = SocketAddr;

    fn network_online(&self) -> bool {
        true
    }

    fn send(&mut self, to: &SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        self.outbound(*to)
            .send(data.to_vec())
            .map_err(|_| TransportError::Unreachable(to.to_string()))
    }

    fn send_oob(&mut self, to: &SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        self.send(to, data)
    }

    fn send_oob_mc(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let seeds: Vec<SocketAddr> = self
            .seeds
            .iter()
            .copied()
            .filter(|seed| *seed != self.advertise)
            .collect();
        for seed in seeds {
            if let Err(e) = self.send(&seed, data) {
                tracing::debug!(%seed, error = %e, "discovery send failed");
            }
        }
        Ok(())
    }

    fn recv(&mut self) -> Option<(SocketAddr, Vec<u8>)> {
        self.data_rx.try_recv().ok()
    }

    fn get_disconnected(&mut self) -> Option<SocketAddr> {
        self.closed_rx.try_recv().ok()
    }

    fn disconnect(&mut self, endpoint: &SocketAddr) {
        // Dropping the sender makes the link task flush and close.
        if lock(&self.links).remove(endpoint).is_some() {
            tracing::debug!(peer = %endpoint, "WebSocket link closed locally");
        }
    }

    fn is_peer_connected(&self, endpoint: &SocketAddr) -> bool {
        lock(&self.links)
            .get(endpoint)
            .is_some_and(|link| link.established)
    }

    fn make_default_gamename(&self) -> String {
        self.advertise.to_string()
    }
}

async fn accept_loop(listener: TcpListener, links: SharedLinks, events: Events) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(accept_link(stream, addr, Arc::clone(&links), events.clone()));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

async fn accept_link(
    stream: TcpStream,
    remote: SocketAddr,
    links: SharedLinks,
    events: Events,
) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%remote, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    let peer = match ws.next().await {
        Some(Ok(Message::Text(text))) => match text.as_str().parse::<SocketAddr>() {
            Ok(peer) => peer,
            Err(_) => {
                tracing::debug!(%remote, "invalid hello frame");
                return;
            }
        },
        _ => {
            tracing::debug!(%remote, "link closed before hello");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let id = NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed);
    lock(&links).insert(
        peer,
        Link {
            id,
            outbound: tx,
            established: true,
        },
    );
    tracing::debug!(%peer, %remote, "accepted WebSocket link");

    run_link(ws, peer, id, rx, links, events).await;
}

async fn dial(
    peer: SocketAddr,
    advertise: SocketAddr,
    id: u64,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    links: SharedLinks,
    events: Events,
    connect_timeout: Duration,
) {
    let url = format!("ws://{peer}");
    let mut ws = match tokio::time::timeout(
        connect_timeout,
        tokio_tungstenite::connect_async(url),
    )
    .await
    {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            tracing::debug!(%peer, error = %e, "dial failed");
            close_link(&links, &events, peer, id);
            return;
        }
        Err(_) => {
            tracing::debug!(%peer, "dial timed out");
            close_link(&links, &events, peer, id);
            return;
        }
    };

    if let Err(e) = ws.send(Message::Text(advertise.to_string().into())).await {
        tracing::debug!(%peer, error = %e, "hello failed");
        close_link(&links, &events, peer, id);
        return;
    }
    if let Some(link) = lock(&links).get_mut(&peer).filter(|l| l.id == id) {
        link.established = true;
    }

    run_link(ws, peer, id, outbound, links, events).await;
}

async fn run_link<S>(
    ws: WebSocketStream<S>,
    peer: SocketAddr,
    id: u64,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    links: SharedLinks,
    events: Events,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            data = outbound.recv() => match data {
                Some(data) => {
                    if let Err(e) = sink.send(Message::Binary(data.into())).await {
                        tracing::debug!(%peer, error = %e, "send failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    if events.data.send((peer, data.into())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/text after hello
                Some(Err(e)) => {
                    tracing::debug!(%peer, error = %e, "receive failed");
                    break;
                }
            },
        }
    }
    close_link(&links, &events, peer, id);
}

/// Forgets the link and reports it as down, unless it was already replaced
/// or removed locally.
fn close_link(links: &SharedLinks, events: &Events, peer: SocketAddr, id: u64) {
    let mut links = lock(links);
    if links.get(&peer).is_some_and(|link| link.id == id) {
        links.remove(&peer);
        let _ = events.closed.send(peer);
        tracing::debug!(%peer, "WebSocket link down");
    }
}
