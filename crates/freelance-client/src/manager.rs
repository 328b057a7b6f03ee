use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use freelance_common::transport::Router;
use freelance_common::{Clock, Command, FreelanceError, Message, Protocol, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::health::{ServerHealthState, ServerRegistry};

/// The request admitted by the engine and not yet resolved.
#[derive(Debug)]
struct InFlightRequest {
    /// `[sequence number, source, key]`
    message: Message,
    sequence_number: u64,
    expires_at: Duration,
}

/// Client-side request engine.
///
/// Owns the registered servers, the rotation of servers eligible for sending,
/// the timeout schedule and at most one in-flight request. The engine is
/// driven from a single task (see [`Pipeline`](crate::Pipeline)) and never
/// blocks; only the registry is shared, so a heartbeat monitor or monitoring
/// readers can observe liveness concurrently.
///
/// Messages from the application look like `[destination, CONNECT | REQUEST |
/// ERROR, source, args...]`. Outcomes go back to the application on the reply
/// channel as `[OK, server, key, payload]` or `[ERROR]`. An application ERROR
/// abandons the in-flight request and is acknowledged with `[ERROR, reason]`.
pub struct Manager<R: Router> {
    protocol: Protocol,
    router: R,
    replies: mpsc::UnboundedSender<Message>,
    registry: ServerRegistry,
    rotation: VecDeque<Arc<ServerHealthState>>,
    timeouts: BinaryHeap<Reverse<Duration>>,
    /// Number of requests ever admitted
    sequence_number: u64,
    current_request: Option<InFlightRequest>,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl<R: Router> Manager<R> {
    /// Creates an engine sending through `router` and reporting outcomes on
    /// `replies`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configured identity is empty.
    pub fn new(
        router: R,
        replies: mpsc::UnboundedSender<Message>,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let protocol = Protocol::new(config.identity.clone())?;
        Ok(Self {
            protocol,
            router,
            replies,
            registry: ServerRegistry::new(),
            rotation: VecDeque::new(),
            timeouts: BinaryHeap::new(),
            sequence_number: 0,
            current_request: None,
            config,
            clock,
        })
    }

    /// Shares `registry` instead of the engine's own, e.g. with a heartbeat
    /// monitor.
    pub fn with_registry(mut self, registry: ServerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut R {
        &mut self.router
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Endpoints currently eligible for sending, in rotation order.
    pub fn active_servers(&self) -> Vec<String> {
        self.rotation
            .iter()
            .map(|server| server.endpoint().to_string())
            .collect()
    }

    fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Time until the earliest future deadline, or the idle timeout if
    /// nothing is scheduled. Deadlines already passed are discarded.
    pub fn next_timeout(&mut self) -> Duration {
        let now = self.now();
        while let Some(&Reverse(deadline)) = self.timeouts.peek() {
            if deadline <= now {
                self.timeouts.pop();
                continue;
            }
            return deadline - now;
        }
        self.config.idle_timeout
    }

    pub fn is_processing_request(&self) -> bool {
        self.current_request.is_some()
    }

    /// Processes one message from the application (CONNECT, REQUEST or
    /// ERROR).
    ///
    /// # Errors
    ///
    /// - `RequestInFlight` if a REQUEST arrives while another one is
    ///   unresolved. This is a caller contract breach.
    /// - Whatever the router reports for an unusable CONNECT endpoint.
    pub fn process_outbox(&mut self, mut message: Message) -> Result<()> {
        let destination = message.pop_string().unwrap_or_default();
        let token = message.pop_string();

        match Command::parse_opt(token.as_deref()) {
            Command::Request => self.take_ownership_of(message),
            Command::Connect => self.connect_to(&destination),
            Command::Error => {
                self.abandon_current_request(message);
                Ok(())
            }
            _ => {
                warn!(
                    "Ignoring application message [{}] for [{}]",
                    token.unwrap_or_default(),
                    destination
                );
                Ok(())
            }
        }
    }

    fn take_ownership_of(&mut self, mut message: Message) -> Result<()> {
        if self.current_request.is_some() {
            return Err(FreelanceError::RequestInFlight);
        }

        self.sequence_number += 1;
        // replaces REQUEST
        message.push_front(self.sequence_number.to_string());

        let expires_at = self.now() + self.config.request_timeout;
        self.timeouts.push(Reverse(expires_at));

        debug!(
            "Admitted request #[{}] for [{}]",
            self.sequence_number,
            String::from_utf8_lossy(message.last().unwrap_or_default())
        );

        self.current_request = Some(InFlightRequest {
            message,
            sequence_number: self.sequence_number,
            expires_at,
        });
        Ok(())
    }

    /// Drops the in-flight request, if any, and acknowledges with
    /// `[ERROR, reason]`. Every reply for the dropped request was queued
    /// before the acknowledgement, and any later one is dropped as late.
    fn abandon_current_request(&mut self, mut message: Message) {
        // source
        message.pop_front();
        let reason = message.pop_front().unwrap_or_default();

        if let Some(request) = self.current_request.take() {
            debug!(
                "Request #[{}] abandoned by the application: {}",
                request.sequence_number,
                String::from_utf8_lossy(&reason)
            );
        }
        self.reply_to_application(Message::new().with(Command::Error.as_str()).with(reason));
    }

    fn connect_to(&mut self, endpoint: &str) -> Result<()> {
        self.router.connect(endpoint)?;

        let server = match self.registry.get(endpoint) {
            Some(server) => server,
            None => {
                let server = Arc::new(ServerHealthState::new(
                    endpoint,
                    self.config.health_settings(),
                    self.clock.clone(),
                ));
                self.registry.insert(server.clone());
                server
            }
        };

        self.add_to_rotation(&server);
        server.refresh();
        self.schedule(&server);

        info!("Connecting to [{}]...", endpoint);
        Ok(())
    }

    fn add_to_rotation(&mut self, server: &Arc<ServerHealthState>) {
        if !self.rotation.iter().any(|s| Arc::ptr_eq(s, server)) {
            self.rotation.push_back(server.clone());
        }
    }

    fn schedule(&mut self, server: &ServerHealthState) {
        self.timeouts.push(Reverse(server.unresponsive_at()));
        self.timeouts.push(Reverse(server.next_ping_at()));
    }

    /// Processes one message received from a server.
    ///
    /// Any reply from a registered server refreshes it, and brings it back
    /// into the rotation if it had been evicted. Only a reply carrying the
    /// in-flight sequence number resolves the current request.
    pub fn process_inbox(&mut self, mut reply: Message) {
        let endpoint = reply.pop_string().unwrap_or_default();
        let token = reply.pop_string().unwrap_or_default();
        let command = Command::parse(&token);

        let Some(server) = self.registry.get(&endpoint) else {
            warn!(
                "Received invalid reply from [{}]: server isn't registered",
                endpoint
            );
            return;
        };

        // a shared registry may flip `alive` without touching our rotation
        self.add_to_rotation(&server);
        if !server.is_alive() {
            server.enable();
        }
        server.refresh();
        self.schedule(&server);

        match command {
            Command::Pong => {}
            Command::SequenceNumber => self.handle_reply(&endpoint, &token, reply),
            _ => warn!(
                "Received invalid reply from [{}]. Command/Sequence: [{}]",
                endpoint, token
            ),
        }
    }

    fn handle_reply(&mut self, endpoint: &str, token: &str, mut reply: Message) {
        let matches = match (&self.current_request, token.parse::<u64>()) {
            (Some(request), Ok(sequence_number)) => request.sequence_number == sequence_number,
            _ => false,
        };

        if !matches {
            warn!(
                "Received reply [{}] from [{}] too late: currently at [{}]",
                token, endpoint, self.sequence_number
            );
            return;
        }

        debug!("Request #[{}] answered by [{}]", token, endpoint);
        self.current_request = None;
        reply.push_front(Command::Ok.as_str());
        self.reply_to_application(reply);
    }

    pub fn is_request_expired(&self) -> bool {
        match &self.current_request {
            Some(request) => request.expires_at <= self.now(),
            None => false,
        }
    }

    /// Discards the in-flight request and sends `[ERROR]` to the application.
    pub fn fail_current_request(&mut self) {
        if let Some(request) = self.current_request.take() {
            warn!(
                "Request #[{}] expired after {}ms",
                request.sequence_number,
                self.config.request_timeout.as_millis()
            );
            self.reply_to_application(Message::new().with(Command::Error.as_str()));
        }
    }

    fn reply_to_application(&self, message: Message) {
        if self.replies.send(message).is_err() {
            debug!("Application is gone, dropping reply");
        }
    }

    /// Sends the in-flight request to the first active server, if any.
    ///
    /// The pending request is kept so it can be sent again, to this or
    /// another server, on a later iteration. Send failures are logged only.
    pub fn send_request_to_first_active_server(&mut self) {
        if self.current_request.is_none() {
            return;
        }
        let Some(server) = self.first_active_server() else {
            debug!("No responsive server for the pending request");
            return;
        };
        let Some(request) = &self.current_request else {
            return;
        };

        let mut message = request.message.clone();
        message.push_front(server.endpoint());

        debug!(
            "Sending request #[{}] to [{}]...",
            request.sequence_number,
            server.endpoint()
        );
        let sequence_number = request.sequence_number;
        if let Err(e) = self.router.send(message) {
            warn!(
                "Failed to send request #[{}] to [{}]: {}",
                sequence_number,
                server.endpoint(),
                e
            );
        }
    }

    /// Head of the rotation that is still within its TTL.
    ///
    /// Servers whose TTL passed are popped and disabled along the way.
    pub fn first_active_server(&mut self) -> Option<Arc<ServerHealthState>> {
        while let Some(server) = self.rotation.front() {
            if server.is_unresponsive() {
                if let Some(server) = self.rotation.pop_front() {
                    server.disable();
                }
                continue;
            }
            return Some(server.clone());
        }
        None
    }

    /// Drops every server whose TTL passed from the rotation and disables it,
    /// whether or not a request is waiting for one.
    pub fn evict_unresponsive_servers(&mut self) {
        self.rotation.retain(|server| {
            if server.is_unresponsive() {
                server.disable();
                false
            } else {
                true
            }
        });
    }

    /// Pings every registered server whose ping deadline passed.
    pub fn ping_all_servers(&mut self) {
        for server in self.registry.snapshot() {
            if !server.is_ping_due() {
                continue;
            }

            debug!("Pinging server [{}]...", server.endpoint());
            match self.protocol.ping(server.endpoint()) {
                Ok(ping) => {
                    if let Err(e) = self.router.send(ping) {
                        warn!("Failed to ping [{}]: {}", server.endpoint(), e);
                    }
                }
                Err(e) => warn!("Cannot ping [{}]: {}", server.endpoint(), e),
            }

            server.ping_sent();
            self.timeouts.push(Reverse(server.next_ping_at()));
        }
    }
}
