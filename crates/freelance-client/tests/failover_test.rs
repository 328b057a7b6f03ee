// End-to-end tests for freelance-client
//
// These tests run real ReplyServers on the loopback interface and drive them
// through a Client or a HeartBeater over TCP.

use std::sync::Arc;
use std::time::Duration;

use freelance_client::{Client, ClientConfig, HeartBeatConfig, HeartBeater, ServerRegistry};
use freelance_common::transport::TcpRouter;
use freelance_common::{FreelanceError, MonotonicClock};
use freelance_server::{hash_provider, ReplyServer};
use tokio::task::JoinHandle;
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

const PING_INTERVAL: Duration = Duration::from_millis(100);
const SERVER_TTL: Duration = Duration::from_millis(300);

fn config() -> ClientConfig {
    ClientConfig::default()
        .with_identity("e2e-client")
        .with_request_timeout(Duration::from_secs(3))
        .with_ping_interval(PING_INTERVAL)
        .with_server_ttl(SERVER_TTL)
}

async fn start_server(endpoint: &str, identity: &str) -> (String, JoinHandle<()>) {
    let server = ReplyServer::bind(endpoint, identity, hash_provider())
        .await
        .expect("Failed to bind reply server");
    let endpoint = server.endpoint().to_string();
    (endpoint, server.spawn())
}

/// Stops a server and waits until its task is gone.
async fn stop_server(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_single_server_answers_with_provider_payload() {
    let (endpoint, server) = start_server("tcp://127.0.0.1:0", "server-1").await;

    let mut client = Client::new(config()).unwrap();
    client.connect(&endpoint).await.unwrap();

    let key = Uuid::new_v4();
    let reply = client.request(key).await.unwrap();

    assert_eq!(reply.server, "server-1");
    assert_eq!(reply.key, key.to_string());
    assert_eq!(reply.payload, hash_provider()(&key));
    assert!(client.server(&endpoint).unwrap().is_alive());

    stop_server(server).await;
}

#[tokio::test]
async fn test_consecutive_requests_are_answered() {
    let (endpoint, server) = start_server("tcp://127.0.0.1:0", "server-1").await;

    let mut client = Client::new(config()).unwrap();
    client.connect(&endpoint).await.unwrap();

    for _ in 0..5 {
        let key = Uuid::new_v4();
        let reply = client.request(key).await.unwrap();
        assert_eq!(reply.payload, hash_provider()(&key));
    }

    stop_server(server).await;
}

#[tokio::test]
async fn test_request_without_servers_times_out_and_slot_is_freed() {
    let mut client =
        Client::new(config().with_request_timeout(Duration::from_millis(300))).unwrap();

    let first = client.request(Uuid::new_v4()).await;
    assert!(matches!(first, Err(FreelanceError::Timeout(300))));

    let second = client.request(Uuid::new_v4()).await;
    assert!(matches!(second, Err(FreelanceError::Timeout(300))));
}

#[tokio::test]
async fn test_silent_server_is_disabled_until_it_answers_again() {
    let (endpoint, server) = start_server("tcp://127.0.0.1:0", "server-1").await;

    let mut client = Client::new(config()).unwrap();
    client.connect(&endpoint).await.unwrap();
    client.request(Uuid::new_v4()).await.unwrap();
    let state = client.server(&endpoint).unwrap();
    assert!(state.is_alive());

    stop_server(server).await;
    tokio::time::sleep(SERVER_TTL * 3).await;
    assert!(!state.is_alive());

    // same port again: pings get through and the server is back in rotation
    let (_, server) = start_server(&endpoint, "server-1-again").await;
    tokio::time::sleep(SERVER_TTL * 2).await;
    assert!(state.is_alive());

    let reply = client.request(Uuid::new_v4()).await.unwrap();
    assert_eq!(reply.server, "server-1-again");

    stop_server(server).await;
}

#[tokio::test]
async fn test_request_fails_over_to_second_server() {
    let (first, first_server) = start_server("tcp://127.0.0.1:0", "server-a").await;
    let (second, second_server) = start_server("tcp://127.0.0.1:0", "server-b").await;

    let mut client = Client::new(config()).unwrap();
    client.connect(&first).await.unwrap();
    client.connect(&second).await.unwrap();
    assert_eq!(client.servers().len(), 2);

    let reply = client.request(Uuid::new_v4()).await.unwrap();
    assert_eq!(reply.server, "server-a");

    stop_server(first_server).await;

    let key = Uuid::new_v4();
    let reply = client.request(key).await.unwrap();
    assert_eq!(reply.server, "server-b");
    assert_eq!(reply.payload, hash_provider()(&key));
    assert!(!client.server(&first).unwrap().is_alive());

    stop_server(second_server).await;
}

#[tokio::test]
async fn test_heartbeater_tracks_a_real_server() {
    let (endpoint, server) = start_server("tcp://127.0.0.1:0", "server-1").await;

    let registry = ServerRegistry::new();
    let mut heartbeater = HeartBeater::new(
        TcpRouter::new(),
        registry.clone(),
        HeartBeatConfig { ping_interval: PING_INTERVAL },
        Arc::new(MonotonicClock::new()),
        "e2e-monitor",
    )
    .unwrap();
    let state = heartbeater.watch(&endpoint).unwrap();
    let monitor = heartbeater.spawn();

    tokio::time::sleep(PING_INTERVAL * 3).await;
    assert!(state.is_alive());
    assert!(registry.get(&endpoint).unwrap().is_alive());

    stop_server(server).await;
    tokio::time::sleep(PING_INTERVAL * 10).await;
    assert!(!state.is_alive());

    monitor.abort();
}
