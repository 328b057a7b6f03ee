use std::sync::Arc;

use freelance_common::transport::Router;
use freelance_common::{Clock, Command, Message, Protocol, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HeartBeatConfig;
use crate::health::{ServerHealthState, ServerRegistry};

/// Standalone liveness monitor.
///
/// Works without a [`Manager`](crate::Manager): every cycle it pings the
/// servers that are due (deactivating first those silent for a whole
/// interval), then listens for PONGs for the rest of the interval and
/// reactivates their senders.
///
/// The registry can be shared with whoever needs to read liveness.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use freelance_client::{HeartBeatConfig, HeartBeater, ServerRegistry};
/// use freelance_common::transport::TcpRouter;
/// use freelance_common::MonotonicClock;
///
/// # #[tokio::main]
/// # async fn main() -> freelance_common::Result<()> {
/// let registry = ServerRegistry::new();
/// let mut heartbeater = HeartBeater::new(
///     TcpRouter::new(),
///     registry.clone(),
///     HeartBeatConfig::default(),
///     Arc::new(MonotonicClock::new()),
///     "monitor-1",
/// )?;
/// heartbeater.watch("tcp://127.0.0.1:5555")?;
///
/// let task = heartbeater.spawn();
/// // ... read registry.get("tcp://127.0.0.1:5555") ...
/// task.abort();
/// # Ok(())
/// # }
/// ```
pub struct HeartBeater<R: Router> {
    router: R,
    registry: ServerRegistry,
    config: HeartBeatConfig,
    clock: Arc<dyn Clock>,
    protocol: Protocol,
}

impl<R: Router + 'static> HeartBeater<R> {
    /// Creates a monitor pinging as `identity`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `identity` is empty.
    pub fn new(
        router: R,
        registry: ServerRegistry,
        config: HeartBeatConfig,
        clock: Arc<dyn Clock>,
        identity: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            router,
            registry,
            config,
            clock,
            protocol: Protocol::new(identity)?,
        })
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Connects to `endpoint` and starts tracking it, due for a ping on the
    /// next cycle.
    pub fn watch(&mut self, endpoint: &str) -> Result<Arc<ServerHealthState>> {
        self.router.connect(endpoint)?;

        let server = Arc::new(ServerHealthState::new(
            endpoint,
            self.config.health_settings(),
            self.clock.clone(),
        ));
        server.schedule_ping_now();
        self.registry.insert(server.clone());
        Ok(server)
    }

    /// Starts the monitor on its own task. Aborting the handle cancels it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Runs ping/poll cycles until the transport shuts down.
    pub async fn run(mut self) {
        info!(
            "Heartbeater started, pinging every {}ms",
            self.config.ping_interval.as_millis()
        );

        loop {
            for server in self.registry.snapshot() {
                if server.should_be_pinged() {
                    if server.should_be_deactivated() {
                        server.deactivate();
                    }
                    if !self.ping(&server) {
                        return;
                    }
                }
            }

            // Keep handling PONGs for the rest of the interval
            let end = self.clock.now() + self.config.ping_interval;
            loop {
                let remaining = end.saturating_sub(self.clock.now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, self.router.recv()).await {
                    Ok(Some(pong)) => self.handle(pong),
                    Ok(None) => {
                        info!("Heartbeater has been interrupted: transport shut down");
                        return;
                    }
                    Err(_) => {}
                }
            }
        }
    }

    /// Returns false if the transport is shut down.
    fn ping(&mut self, server: &ServerHealthState) -> bool {
        let ping = match self.protocol.ping(server.endpoint()) {
            Ok(ping) => ping,
            Err(e) => {
                warn!("Cannot ping [{}]: {}", server.endpoint(), e);
                return true;
            }
        };

        match self.router.send(ping) {
            Ok(()) => {
                debug!("Pinged {:?}", server);
                true
            }
            Err(e) if e.is_shutdown() => {
                info!(
                    "Heartbeater has been interrupted: failed to send PING to {}",
                    server.endpoint()
                );
                false
            }
            Err(e) => {
                warn!("Failed to send PING to [{}]: {}", server.endpoint(), e);
                true
            }
        }
    }

    fn handle(&self, mut pong: Message) {
        let endpoint = pong.pop_string().unwrap_or_default();
        let token = pong.pop_string().unwrap_or_default();

        if Command::parse(&token) != Command::Pong {
            warn!(
                "Received invalid reply from [{}]: [{}] expected but [{}] received",
                endpoint,
                Command::Pong,
                token
            );
            return;
        }

        match self.registry.get(&endpoint) {
            Some(server) => {
                server.activate();
                server.refresh();
            }
            None => warn!("Received PONG from unknown server [{}]", endpoint),
        }
    }
}
