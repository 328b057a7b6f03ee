//! Per-server liveness tracking.
//!
//! A [`ServerHealthState`] can be driven two ways, sharing one data model:
//!
//! - by the request engine, which calls [`refresh`](ServerHealthState::refresh)
//!   on every reply, evicts servers whose TTL passed and toggles them with
//!   [`enable`](ServerHealthState::enable)/[`disable`](ServerHealthState::disable);
//! - by the [`HeartBeater`](crate::HeartBeater), which pings servers that are
//!   due, deactivates those silent for a whole interval and toggles them with
//!   [`activate`](ServerHealthState::activate)/[`deactivate`](ServerHealthState::deactivate).
//!
//! All fields are atomics so a monitoring task and a reply-processing task can
//! share one state without a mutex.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use freelance_common::Clock;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::HealthSettings;

/// Liveness record of one remote endpoint.
pub struct ServerHealthState {
    endpoint: String,
    alive: AtomicBool,
    /// Nanoseconds on `clock`
    next_ping_at: AtomicU64,
    /// Nanoseconds on `clock`
    unresponsive_at: AtomicU64,
    /// Set by `schedule_ping_now`, cleared by the next refresh or ping
    ping_requested: AtomicBool,
    settings: HealthSettings,
    clock: Arc<dyn Clock>,
}

impl ServerHealthState {
    /// Creates a state for `endpoint`, not alive, with both deadlines
    /// refreshed relative to now.
    pub fn new(endpoint: impl Into<String>, settings: HealthSettings, clock: Arc<dyn Clock>) -> Self {
        let state = Self {
            endpoint: endpoint.into(),
            alive: AtomicBool::new(false),
            next_ping_at: AtomicU64::new(0),
            unresponsive_at: AtomicU64::new(0),
            ping_requested: AtomicBool::new(false),
            settings,
            clock,
        };
        state.refresh();
        state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn settings(&self) -> HealthSettings {
        self.settings
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Resets both deadlines relative to now.
    pub fn refresh(&self) {
        let now = self.now();
        store(&self.next_ping_at, now + self.settings.ping_interval);
        store(&self.unresponsive_at, now + self.settings.ttl);
        self.ping_requested.store(false, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "Refreshed server");
    }

    /// Pushes the next ping one interval past now, leaving the TTL alone.
    pub fn ping_sent(&self) {
        store(&self.next_ping_at, self.now() + self.settings.ping_interval);
        self.ping_requested.store(false, Ordering::SeqCst);
    }

    /// Makes the server due for a ping right away, and counts its silence
    /// from now.
    pub fn schedule_ping_now(&self) {
        store(&self.next_ping_at, self.now());
        self.ping_requested.store(true, Ordering::SeqCst);
    }

    pub fn next_ping_at(&self) -> Duration {
        load(&self.next_ping_at)
    }

    pub fn unresponsive_at(&self) -> Duration {
        load(&self.unresponsive_at)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Whether the next-ping deadline has been reached.
    pub fn is_ping_due(&self) -> bool {
        self.ping_requested() || self.next_ping_at() <= self.now()
    }

    /// Whether the TTL elapsed without a refresh.
    pub fn is_unresponsive(&self) -> bool {
        self.unresponsive_at() <= self.now()
    }

    /// Whether the next-ping deadline is strictly in the past.
    pub fn should_be_pinged(&self) -> bool {
        self.ping_requested() || self.next_ping_at() < self.now()
    }

    fn ping_requested(&self) -> bool {
        self.ping_requested.load(Ordering::SeqCst)
    }

    /// Whether a full ping interval has passed since the next-ping deadline.
    pub fn should_be_deactivated(&self) -> bool {
        let now = self.now();
        match now.checked_sub(self.settings.ping_interval) {
            Some(threshold) => self.next_ping_at() < threshold,
            None => false,
        }
    }

    /// Marks the server alive. Returns whether this was a transition.
    pub fn enable(&self) -> bool {
        let changed = self.transition(true);
        if changed {
            info!("Server [{}] is responsive", self.endpoint);
        }
        changed
    }

    /// Marks the server dead. Returns whether this was a transition.
    pub fn disable(&self) -> bool {
        let changed = self.transition(false);
        if changed {
            info!("Server [{}] is unresponsive", self.endpoint);
        }
        changed
    }

    /// Heartbeat-side [`enable`](Self::enable).
    pub fn activate(&self) -> bool {
        let changed = self.transition(true);
        if changed {
            debug!("Activated {:?}", self);
        }
        changed
    }

    /// Heartbeat-side [`disable`](Self::disable).
    pub fn deactivate(&self) -> bool {
        let changed = self.transition(false);
        if changed {
            debug!("Deactivated {:?}", self);
        }
        changed
    }

    fn transition(&self, alive: bool) -> bool {
        self.alive
            .compare_exchange(!alive, alive, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for ServerHealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHealthState")
            .field("endpoint", &self.endpoint)
            .field("alive", &self.is_alive())
            .field("next_ping_at", &self.next_ping_at())
            .field("unresponsive_at", &self.unresponsive_at())
            .finish()
    }
}

fn store(slot: &AtomicU64, at: Duration) {
    slot.store(u64::try_from(at.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
}

fn load(slot: &AtomicU64) -> Duration {
    Duration::from_nanos(slot.load(Ordering::SeqCst))
}

/// Endpoint to liveness state map, shareable between the request engine, a
/// heartbeat monitor and monitoring readers.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Arc<RwLock<HashMap<String, Arc<ServerHealthState>>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `state` under its endpoint, replacing any previous entry.
    pub fn insert(&self, state: Arc<ServerHealthState>) -> Option<Arc<ServerHealthState>> {
        self.servers
            .write()
            .insert(state.endpoint().to_string(), state)
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<ServerHealthState>> {
        self.servers.read().get(endpoint).cloned()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.servers.read().contains_key(endpoint)
    }

    /// Current states, sorted by endpoint.
    pub fn snapshot(&self) -> Vec<Arc<ServerHealthState>> {
        let mut servers: Vec<_> = self.servers.read().values().cloned().collect();
        servers.sort_by(|a, b| a.endpoint().cmp(b.endpoint()));
        servers
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freelance_common::ManualClock;

    const PING: Duration = Duration::from_secs(2);
    const TTL: Duration = Duration::from_secs(6);

    fn state(clock: &Arc<ManualClock>) -> ServerHealthState {
        let settings = HealthSettings { ping_interval: PING, ttl: TTL };
        ServerHealthState::new("tcp://127.0.0.1:5555", settings, clock.clone())
    }

    #[test]
    fn test_new_state_is_not_alive_and_refreshed() {
        let clock = Arc::new(ManualClock::starting_at(Duration::from_secs(10)));
        let server = state(&clock);

        assert!(!server.is_alive());
        assert_eq!(server.next_ping_at(), Duration::from_secs(12));
        assert_eq!(server.unresponsive_at(), Duration::from_secs(16));
    }

    #[test]
    fn test_refresh_moves_both_deadlines_forward() {
        let clock = Arc::new(ManualClock::new());
        clock.set_auto_increment(Duration::from_millis(1));
        let server = state(&clock);

        for _ in 0..5 {
            let before_ping = server.next_ping_at();
            let before_ttl = server.unresponsive_at();
            server.refresh();
            assert!(server.next_ping_at() > before_ping);
            assert!(server.unresponsive_at() > before_ttl);
        }
    }

    #[test]
    fn test_enable_and_disable_return_true_only_on_transition() {
        let clock = Arc::new(ManualClock::new());
        let server = state(&clock);

        assert!(server.enable());
        assert!(!server.enable());
        assert!(server.is_alive());

        assert!(server.disable());
        assert!(!server.disable());
        assert!(!server.is_alive());
    }

    #[test]
    fn test_activate_and_deactivate_share_the_flag() {
        let clock = Arc::new(ManualClock::new());
        let server = state(&clock);

        assert!(server.activate());
        assert!(!server.activate());
        assert!(!server.enable());
        assert!(server.deactivate());
        assert!(!server.disable());
    }

    #[test]
    fn test_heartbeat_predicates() {
        let clock = Arc::new(ManualClock::new());
        let server = state(&clock);

        // next ping at 2s
        assert!(!server.should_be_pinged());
        clock.set(Duration::from_secs(2));
        assert!(!server.should_be_pinged());
        assert!(server.is_ping_due());

        clock.advance(Duration::from_millis(1));
        assert!(server.should_be_pinged());
        assert!(!server.should_be_deactivated());

        clock.set(Duration::from_secs(4));
        assert!(!server.should_be_deactivated());
        clock.advance(Duration::from_millis(1));
        assert!(server.should_be_deactivated());
    }

    #[test]
    fn test_schedule_ping_now() {
        let clock = Arc::new(ManualClock::starting_at(Duration::from_secs(1)));
        let server = state(&clock);

        server.schedule_ping_now();
        assert!(server.should_be_pinged());
        assert!(!server.should_be_deactivated());

        clock.advance(Duration::from_millis(2_001));
        assert!(server.should_be_deactivated());

        server.refresh();
        assert!(!server.should_be_pinged());
    }

    #[test]
    fn test_schedule_ping_now_at_clock_origin() {
        let clock = Arc::new(ManualClock::new());
        let server = state(&clock);

        server.schedule_ping_now();
        assert!(server.should_be_pinged());
        assert!(server.is_ping_due());
    }

    #[test]
    fn test_ping_sent_keeps_ttl() {
        let clock = Arc::new(ManualClock::new());
        let server = state(&clock);

        clock.set(Duration::from_secs(3));
        server.ping_sent();

        assert_eq!(server.next_ping_at(), Duration::from_secs(5));
        assert_eq!(server.unresponsive_at(), TTL);
        assert!(!server.is_unresponsive());

        clock.set(TTL);
        assert!(server.is_unresponsive());
    }

    #[test]
    fn test_registry_snapshot_is_sorted() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let registry = ServerRegistry::new();
        for endpoint in ["tcp://b:1", "tcp://a:1", "tcp://c:1"] {
            registry.insert(Arc::new(ServerHealthState::new(
                endpoint,
                HealthSettings::default(),
                clock.clone(),
            )));
        }

        let endpoints: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|s| s.endpoint().to_string())
            .collect();
        assert_eq!(endpoints, vec!["tcp://a:1", "tcp://b:1", "tcp://c:1"]);
        assert!(registry.contains("tcp://b:1"));
        assert_eq!(registry.len(), 3);
    }
}
