use std::time::Duration;

/// Default local identity when none is configured
pub const DEFAULT_IDENTITY: &str = "freelance-client";

/// Client configuration.
///
/// The three timing knobs (`request_timeout`, `ping_interval`, `server_ttl`)
/// govern every scheduling decision of the client engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Source identity stamped into every outgoing message
    pub identity: String,
    /// Give up on a request if no server replied within this time
    pub request_timeout: Duration,
    /// Ping interval for servers we think are alive
    pub ping_interval: Duration,
    /// A server silent for this long is considered dead
    pub server_ttl: Duration,
    /// Time `Client::connect` waits for a new link to come up
    pub connect_settle: Duration,
    /// Wake-up interval when nothing is scheduled
    pub idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            request_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(2),
            server_ttl: Duration::from_secs(6),
            connect_settle: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_server_ttl(mut self, ttl: Duration) -> Self {
        self.server_ttl = ttl;
        self
    }

    pub fn with_connect_settle(mut self, settle: Duration) -> Self {
        self.connect_settle = settle;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Liveness settings handed to every tracked server.
    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            ping_interval: self.ping_interval,
            ttl: self.server_ttl,
        }
    }
}

/// Per-server liveness timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    pub ping_interval: Duration,
    pub ttl: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        ClientConfig::default().health_settings()
    }
}

/// Standalone heartbeat monitor configuration.
#[derive(Debug, Clone)]
pub struct HeartBeatConfig {
    /// Length of one ping/poll cycle; a server silent for a whole cycle is
    /// deactivated
    pub ping_interval: Duration,
}

impl Default for HeartBeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(2),
        }
    }
}

impl HeartBeatConfig {
    /// Liveness settings for servers watched by the heartbeat monitor.
    ///
    /// The monitor deactivates on missed pings, so the TTL is three intervals
    /// as for the request engine.
    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            ping_interval: self.ping_interval,
            ttl: self.ping_interval * 3,
        }
    }
}
