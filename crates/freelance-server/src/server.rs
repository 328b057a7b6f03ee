use freelance_common::transport::{Router, TcpRouter};
use freelance_common::{Message, Protocol, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::Provider;

/// Single-task reply server.
///
/// Every inbound message is answered through [`Protocol::reply`]: PINGs get a
/// PONG, requests get the provider's payload and anything else gets UNKNOWN.
///
/// # Example
///
/// ```no_run
/// use freelance_server::{hash_provider, ReplyServer};
///
/// # #[tokio::main]
/// # async fn main() -> freelance_common::Result<()> {
/// let server = ReplyServer::bind("tcp://0.0.0.0:5555", "server-1", hash_provider()).await?;
/// println!("Serving on {}", server.endpoint());
/// server.run().await;
/// # Ok(())
/// # }
/// ```
pub struct ReplyServer {
    router: TcpRouter,
    protocol: Protocol,
    provider: Provider,
    endpoint: String,
}

impl ReplyServer {
    /// Binds `endpoint` and answers as `identity`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty identity, `InvalidEndpoint` or
    /// `Connection` if the endpoint cannot be bound.
    pub async fn bind(
        endpoint: &str,
        identity: impl Into<String>,
        provider: Provider,
    ) -> Result<Self> {
        let protocol = Protocol::new(identity)?;
        let router = TcpRouter::bind(endpoint).await?;
        let endpoint = router.endpoint().unwrap_or_else(|| endpoint.to_string());

        Ok(Self {
            router,
            protocol,
            provider,
            endpoint,
        })
    }

    /// The bound endpoint, with the actual port when port 0 was requested.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> &str {
        self.protocol.source()
    }

    /// Starts the server on its own task. Aborting the handle stops it and
    /// closes every connection.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Answers messages until the transport shuts down.
    pub async fn run(mut self) {
        info!(
            "Reply server [{}] serving on {}",
            self.protocol.source(),
            self.endpoint
        );

        while let Some(message) = self.router.recv().await {
            if let Err(e) = self.handle(message) {
                if e.is_shutdown() {
                    break;
                }
                warn!("Failed to send reply: {}", e);
            }
        }

        info!("Reply server [{}] stopped", self.protocol.source());
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        let provider = &self.provider;
        let reply = self.protocol.reply(message, |key| provider(key));
        debug!("Sending {}", reply);
        self.router.send(reply)
    }
}
