use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::error::{FreelanceError, Result};
use crate::protocol::Message;
use crate::transport::codec::FrameCodec;
use crate::transport::Router;

/// Delay between two dial attempts to the same endpoint
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

const SCHEME: &str = "tcp://";

/// Parses a `tcp://host:port` endpoint into a dialable `host:port` address.
///
/// A bare `host:port` is accepted as well.
///
/// # Example
///
/// ```
/// use freelance_common::transport::parse_endpoint;
///
/// assert_eq!(parse_endpoint("tcp://127.0.0.1:5555").unwrap(), "127.0.0.1:5555");
/// assert!(parse_endpoint("udp://127.0.0.1:5555").is_err());
/// assert!(parse_endpoint("tcp://127.0.0.1").is_err());
/// ```
pub fn parse_endpoint(endpoint: &str) -> Result<String> {
    let address = match endpoint.strip_prefix(SCHEME) {
        Some(address) => address,
        None if endpoint.contains("://") => {
            return Err(FreelanceError::InvalidEndpoint(format!(
                "Unsupported scheme in '{}', expected {}host:port",
                endpoint, SCHEME
            )));
        }
        None => endpoint,
    };

    let valid = match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(FreelanceError::InvalidEndpoint(format!(
            "Expected {}host:port, got '{}'",
            SCHEME, endpoint
        )));
    }

    Ok(address.to_string())
}

/// Formats a socket address as a `tcp://` endpoint.
pub fn format_endpoint(addr: SocketAddr) -> String {
    format!("{}{}", SCHEME, addr)
}

/// Something that happened on one of the router's connections.
#[derive(Debug)]
pub(crate) enum PeerEvent {
    /// A peer became routable under the given identity.
    Joined(String, mpsc::UnboundedSender<Message>),
    /// Inbound message, identity already prepended.
    Inbound(Message),
    Left(String),
}

/// Identity-routing TCP transport.
///
/// Every connection is known under an identity: the endpoint string passed to
/// [`connect`](Router::connect) for outgoing connections, the peer's socket
/// address for connections accepted by a bound router (see
/// [`TcpRouter::bind`]).
///
/// Outgoing connections are owned by one background task each. The task dials
/// the endpoint, redials every reconnect interval while the endpoint is
/// unreachable, writes queued outbound messages and forwards inbound ones.
/// Messages sent while the link is down stay queued until it comes back.
///
/// # Example
///
/// ```no_run
/// use freelance_common::protocol::Protocol;
/// use freelance_common::transport::{Router, TcpRouter};
///
/// # #[tokio::main]
/// # async fn main() -> freelance_common::Result<()> {
/// let protocol = Protocol::new("client-1")?;
/// let mut router = TcpRouter::new();
///
/// router.connect("tcp://127.0.0.1:5555")?;
/// router.send(protocol.ping("tcp://127.0.0.1:5555")?)?;
///
/// let pong = router.recv().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TcpRouter {
    peers: HashMap<String, mpsc::UnboundedSender<Message>>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    tasks: Vec<JoinHandle<()>>,
    reconnect_interval: Duration,
    pub(crate) local_addr: Option<SocketAddr>,
    closed: bool,
}

impl TcpRouter {
    /// Creates a router with no connections.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            peers: HashMap::new(),
            events_tx,
            events_rx,
            tasks: Vec::new(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            local_addr: None,
            closed: false,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Number of routable peers seen so far.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Tears every connection down. Afterwards `recv` returns `None` and
    /// `send` fails with `TransportClosed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.peers.clear();
        self.events_rx.close();
        self.closed = true;
        debug!("Router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn events(&self) -> mpsc::UnboundedSender<PeerEvent> {
        self.events_tx.clone()
    }

    pub(crate) fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }
}

impl Default for TcpRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpRouter {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Router for TcpRouter {
    fn connect(&mut self, endpoint: &str) -> Result<()> {
        if self.closed {
            return Err(FreelanceError::TransportClosed);
        }
        let address = parse_endpoint(endpoint)?;
        if self.peers.contains_key(endpoint) {
            return Ok(());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.peers.insert(endpoint.to_string(), outbound_tx);

        let task = tokio::spawn(run_connector(
            endpoint.to_string(),
            address,
            outbound_rx,
            self.events(),
            self.reconnect_interval,
        ));
        self.track(task);

        debug!("Connecting to {}", endpoint);
        Ok(())
    }

    fn send(&mut self, mut message: Message) -> Result<()> {
        if self.closed {
            return Err(FreelanceError::TransportClosed);
        }
        let identity = message.pop_string().ok_or_else(|| {
            FreelanceError::InvalidMessage("Cannot route a message without frames".to_string())
        })?;

        let peer = self.peers.get(&identity).ok_or_else(|| {
            FreelanceError::Transport(format!("No route to [{}]", identity))
        })?;

        if peer.send(message).is_err() {
            self.peers.remove(&identity);
            return Err(FreelanceError::Transport(format!(
                "Connection to [{}] is gone",
                identity
            )));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Message> {
        if self.closed {
            return None;
        }
        loop {
            match self.events_rx.recv().await? {
                PeerEvent::Inbound(message) => return Some(message),
                PeerEvent::Joined(identity, sender) => {
                    debug!("Peer [{}] joined", identity);
                    self.peers.insert(identity, sender);
                }
                PeerEvent::Left(identity) => {
                    debug!("Peer [{}] left", identity);
                    self.peers.remove(&identity);
                }
            }
        }
    }
}

/// Owns one outgoing connection for the lifetime of the router.
async fn run_connector(
    endpoint: String,
    address: String,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<PeerEvent>,
    reconnect_interval: Duration,
) {
    let mut attempts: u64 = 0;
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!("Connected to {}", endpoint);
                attempts = 0;
                let _ = stream.set_nodelay(true);
                let (reader, writer) = stream.into_split();
                match serve_connection(&endpoint, reader, writer, &mut outbound, &events).await {
                    ConnectionEnd::PeerClosed => info!("Connection to {} lost", endpoint),
                    ConnectionEnd::RouterGone => return,
                }
            }
            Err(e) => {
                attempts += 1;
                if attempts == 1 {
                    debug!("Failed to connect to {}: {}", endpoint, e);
                }
            }
        }
        tokio::time::sleep(reconnect_interval).await;
    }
}

pub(crate) enum ConnectionEnd {
    PeerClosed,
    RouterGone,
}

/// Pumps one established connection until either side goes away.
///
/// Inbound messages are tagged with `identity` and forwarded as events; queued
/// outbound messages are written in order.
pub(crate) async fn serve_connection<R, W>(
    identity: &str,
    mut reader: R,
    mut writer: W,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    events: &mpsc::UnboundedSender<PeerEvent>,
) -> ConnectionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let inbound = async {
        loop {
            match FrameCodec::read_message(&mut reader).await {
                Ok(Some(mut message)) => {
                    message.push_front(identity);
                    if events.send(PeerEvent::Inbound(message)).is_err() {
                        return ConnectionEnd::RouterGone;
                    }
                }
                Ok(None) => return ConnectionEnd::PeerClosed,
                Err(e) => {
                    warn!("Dropping connection to [{}]: {}", identity, e);
                    return ConnectionEnd::PeerClosed;
                }
            }
        }
    };
    tokio::pin!(inbound);

    loop {
        tokio::select! {
            end = &mut inbound => return end,
            next = outbound.recv() => match next {
                Some(message) => {
                    if let Err(e) = FrameCodec::write_message(&mut writer, &message).await {
                        warn!("Failed to write to [{}]: {}", identity, e);
                        return ConnectionEnd::PeerClosed;
                    }
                }
                None => return ConnectionEnd::RouterGone,
            },
        }
    }
}
