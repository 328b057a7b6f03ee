use std::sync::Arc;

use freelance_common::transport::{Router, TcpRouter};
use freelance_common::{Clock, Command, FreelanceError, Message, MonotonicClock, Protocol, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::health::{ServerHealthState, ServerRegistry};
use crate::manager::Manager;
use crate::pipeline::Pipeline;

/// Destination frame of application requests; the engine picks the server.
const UNUSED: &str = "UNUSED";

/// Reason sent with, and echoed back for, an abandoned request.
const ABANDONED: &str = "ABANDONED";

/// Successful answer to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Source identity of the answering server
    pub server: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Freelance client.
///
/// Talks to its [`Pipeline`] over two channels and blocks each caller until
/// the request resolves. `request` takes `&mut self`, so a client can never
/// have two requests in flight. A `request` future dropped before it resolved
/// (e.g. under `tokio::time::timeout`) is abandoned on the next call, and
/// whatever the pipeline still sends for it is discarded.
///
/// # Example
///
/// ```no_run
/// use freelance_client::{Client, ClientConfig};
/// use uuid::Uuid;
///
/// # #[tokio::main]
/// # async fn main() -> freelance_common::Result<()> {
/// let mut client = Client::new(ClientConfig::default().with_identity("10.0.0.7"))?;
/// client.connect("tcp://10.0.0.1:5555").await?;
/// client.connect("tcp://10.0.0.2:5555").await?;
///
/// let reply = client.request(Uuid::new_v4()).await?;
/// println!("{} answered {} bytes", reply.server, reply.payload.len());
/// # Ok(())
/// # }
/// ```
pub struct Client {
    commands: mpsc::UnboundedSender<Message>,
    replies: mpsc::UnboundedReceiver<Message>,
    protocol: Protocol,
    config: ClientConfig,
    registry: ServerRegistry,
    pipeline: Option<JoinHandle<()>>,
    /// A submitted request has not been answered yet
    in_flight: bool,
    /// Abandon acknowledgements still to come from the pipeline
    abandoned: usize,
}

impl Client {
    /// Creates a client over TCP and starts its pipeline.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_router(TcpRouter::new(), Arc::new(MonotonicClock::new()), config)
    }

    /// Creates a client over any transport and time source.
    pub fn with_router<R: Router + 'static>(
        router: R,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Result<Self> {
        let protocol = Protocol::new(config.identity.clone())?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let manager = Manager::new(router, replies_tx, config.clone(), clock)?;
        let registry = manager.registry().clone();
        let pipeline = Pipeline::new(manager, commands_rx).spawn();

        Ok(Self {
            commands: commands_tx,
            replies: replies_rx,
            protocol,
            config,
            registry,
            pipeline: Some(pipeline),
            in_flight: false,
            abandoned: 0,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to a server, then waits the settle interval so the link is up
    /// before the first request is routed.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let connect = self.protocol.connect(endpoint)?;
        self.submit(connect)?;
        tokio::time::sleep(self.config.connect_settle).await;
        Ok(())
    }

    /// Sends a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// - `Timeout` if no server answered within the request timeout
    /// - `TransportClosed` if the pipeline is gone
    /// - `InvalidMessage` if the pipeline answered something unexpected
    ///
    /// # Cancel safety
    ///
    /// Cancelling this future does not desynchronize the client. The next call
    /// abandons the cancelled request first and skips its outcome.
    pub async fn request(&mut self, key: Uuid) -> Result<Reply> {
        if self.in_flight {
            let abandon = self.protocol.error(UNUSED, ABANDONED)?;
            self.submit(abandon)?;
            self.abandoned += 1;
            self.in_flight = false;
        }

        let request = self.protocol.request(UNUSED, &key)?;
        self.submit(request)?;
        self.in_flight = true;

        let mut reply = loop {
            let reply = self
                .replies
                .recv()
                .await
                .ok_or(FreelanceError::TransportClosed)?;
            if self.abandoned == 0 {
                break reply;
            }
            // outcome of an abandoned request, or the acknowledgement ending it
            if is_abandon_ack(&reply) {
                self.abandoned -= 1;
            }
        };
        self.in_flight = false;

        let token = reply.pop_string();
        match Command::parse_opt(token.as_deref()) {
            Command::Ok => {
                let server = reply.pop_string().unwrap_or_default();
                let key = reply.pop_string().unwrap_or_default();
                let payload = reply.pop_front().unwrap_or_default();
                Ok(Reply { server, key, payload })
            }
            Command::Error => Err(FreelanceError::Timeout(
                self.config.request_timeout.as_millis() as u64,
            )),
            _ => Err(FreelanceError::InvalidMessage(format!(
                "Unexpected reply [{}] from pipeline",
                token.unwrap_or_default()
            ))),
        }
    }

    /// Liveness of a connected server.
    pub fn server(&self, endpoint: &str) -> Option<Arc<ServerHealthState>> {
        self.registry.get(endpoint)
    }

    /// Liveness of every connected server, sorted by endpoint.
    pub fn servers(&self) -> Vec<Arc<ServerHealthState>> {
        self.registry.snapshot()
    }

    /// Stops the pipeline and drops its connections.
    pub fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.abort();
        }
    }

    fn submit(&self, message: Message) -> Result<()> {
        self.commands
            .send(message)
            .map_err(|_| FreelanceError::TransportClosed)
    }
}

fn is_abandon_ack(reply: &Message) -> bool {
    reply.len() == 2
        && reply.get_str(0) == Some(Command::Error.as_str())
        && reply.get_str(1) == Some(ABANDONED)
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
