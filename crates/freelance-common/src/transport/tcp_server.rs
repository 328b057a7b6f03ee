use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::protocol::error::{FreelanceError, Result};
use crate::transport::tcp::{format_endpoint, parse_endpoint, serve_connection, PeerEvent};
use crate::transport::TcpRouter;

impl TcpRouter {
    /// Creates a router that accepts connections on `endpoint`.
    ///
    /// Each accepted connection becomes routable under the peer's socket
    /// address (e.g. `127.0.0.1:49152`), which is the identity prepended to
    /// every message received on it. Binding port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    ///
    /// # Arguments
    /// * `endpoint` - The endpoint to bind to (e.g., "tcp://0.0.0.0:5555")
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let address = parse_endpoint(endpoint)?;
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| FreelanceError::Connection(format!("Failed to bind to {}: {}", endpoint, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| FreelanceError::Connection(format!("Failed to get local addr: {}", e)))?;

        let mut router = TcpRouter::new();
        router.local_addr = Some(local_addr);
        let task = tokio::spawn(accept_loop(listener, router.events()));
        router.track(task);

        info!("Listening on {}", format_endpoint(local_addr));
        Ok(router)
    }

    /// Gets the actual bound address, if this router was created by `bind`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The bound address as a `tcp://` endpoint clients can connect to.
    pub fn endpoint(&self) -> Option<String> {
        self.local_addr.map(format_endpoint)
    }
}

/// Accepts connections until the router is dropped.
///
/// Connection tasks live in a `JoinSet` owned by this task, so aborting the
/// accept loop aborts them as well.
async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<PeerEvent>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("Connection established from {}", peer_addr);
                    connections.spawn(handle_connection(stream, peer_addr, events.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }

        if events.is_closed() {
            return;
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let identity = peer_addr.to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    if events
        .send(PeerEvent::Joined(identity.clone(), outbound_tx))
        .is_err()
    {
        return;
    }

    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();
    serve_connection(&identity, reader, writer, &mut outbound_rx, &events).await;

    debug!("Connection closed by peer {}", identity);
    let _ = events.send(PeerEvent::Left(identity));
}
