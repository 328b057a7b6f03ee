//! # Freelance CLI Entry Point
//!
//! Main binary for the Freelance request/reply runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Start two servers
//! freelance serve -b tcp://0.0.0.0:5555 -i server-1
//! freelance serve -b tcp://0.0.0.0:5556 -i server-2
//!
//! # Send a request; the first live server answers
//! freelance request -s tcp://127.0.0.1:5555 -s tcp://127.0.0.1:5556
//!
//! # Follow server liveness
//! freelance watch -s tcp://127.0.0.1:5555 -s tcp://127.0.0.1:5556
//! ```
//!
//! ## Endpoint Format
//!
//! Endpoints are `tcp://host:port`. A bare `host:port` is accepted as well.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use argh::FromArgs;
use freelance_cli::report::{RequestReport, ServerStatus};
use freelance_client::{Client, ClientConfig, HeartBeatConfig, HeartBeater, ServerRegistry};
use freelance_common::transport::{parse_endpoint, TcpRouter};
use freelance_common::MonotonicClock;
use freelance_server::{hash_provider, ReplyServer};
use uuid::Uuid;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Freelance - broker-less request/reply with client-side failover
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: Start a reply server
/// - **Request**: Send keyed requests through a failover client
/// - **Watch**: Monitor server liveness with a heartbeater
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Request(RequestArgs),
    Watch(WatchArgs),
}

/// Arguments for starting a reply server.
///
/// The server answers PINGs with PONG and every request with the 4-byte
/// hash of its key.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a reply server
struct ServeArgs {
    /// endpoint to bind to
    ///
    /// Defaults to "tcp://0.0.0.0:5555". Port 0 picks a free port; the
    /// actual endpoint is logged at startup.
    #[argh(option, short = 'b', default = "\"tcp://0.0.0.0:5555\".into()")]
    bind: String,

    /// identity reported in every reply
    #[argh(option, short = 'i', default = "\"freelance-server\".into()")]
    identity: String,
}

/// Arguments for sending requests.
///
/// Every request goes to the first server believed alive and is resent to
/// live servers until one answers or the request timeout elapses.
#[derive(FromArgs)]
#[argh(subcommand, name = "request")]
/// send keyed requests to a set of servers
struct RequestArgs {
    /// server endpoint to connect to (repeatable)
    #[argh(option, short = 's', long = "server")]
    servers: Vec<String>,

    /// request key; a random key is used when omitted
    #[argh(option, short = 'k')]
    key: Option<Uuid>,

    /// number of requests to send
    #[argh(option, short = 'n', default = "1")]
    count: u32,

    /// identity announced to servers
    #[argh(option, short = 'i', default = "\"freelance-client\".into()")]
    identity: String,

    /// milliseconds before an unanswered request fails
    #[argh(option, long = "request-timeout-ms", default = "10_000")]
    request_timeout_ms: u64,

    /// milliseconds between pings to idle servers
    #[argh(option, long = "ping-interval-ms", default = "2_000")]
    ping_interval_ms: u64,

    /// milliseconds of silence after which a server counts as unresponsive
    #[argh(option, long = "server-ttl-ms", default = "6_000")]
    server_ttl_ms: u64,
}

/// Arguments for monitoring servers.
#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// ping servers and print their liveness every interval
struct WatchArgs {
    /// server endpoint to watch (repeatable)
    #[argh(option, short = 's', long = "server")]
    servers: Vec<String>,

    /// identity announced to servers
    #[argh(option, short = 'i', default = "\"freelance-monitor\".into()")]
    identity: String,

    /// milliseconds between pings
    #[argh(option, long = "ping-interval-ms", default = "2_000")]
    ping_interval_ms: u64,

    /// stop after this many reports; runs until interrupted otherwise
    #[argh(option)]
    cycles: Option<u32>,
}

impl RequestArgs {
    fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_identity(self.identity.clone())
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_ping_interval(Duration::from_millis(self.ping_interval_ms))
            .with_server_ttl(Duration::from_millis(self.server_ttl_ms))
    }
}

/// Validates every endpoint before anything connects.
fn validate_endpoints(endpoints: &[String]) -> Result<()> {
    if endpoints.is_empty() {
        tracing::warn!("No servers specified! Use --server <endpoint> to add servers.");
    }
    for endpoint in endpoints {
        parse_endpoint(endpoint)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to INFO, RUST_LOG overrides. Logs go to stderr so stdout
    // carries only JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Request(args) => run_request(args).await,
        Commands::Watch(args) => run_watch(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting reply server [{}]", args.identity);

    let server = ReplyServer::bind(&args.bind, args.identity, hash_provider()).await?;
    tracing::info!("Bound to: {}", server.endpoint());

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }
    Ok(())
}

/// Executes the `request` subcommand.
///
/// Prints one [`RequestReport`] per answered request. The first request that
/// times out ends the command with an error.
async fn run_request(args: RequestArgs) -> Result<()> {
    validate_endpoints(&args.servers)?;

    let mut client = Client::new(args.config())?;
    for endpoint in &args.servers {
        client.connect(endpoint).await?;
    }

    for _ in 0..args.count {
        let key = args.key.unwrap_or_else(Uuid::new_v4);
        let started = Instant::now();
        let reply = client.request(key).await?;

        let report = RequestReport::new(&reply, started.elapsed());
        println!("{}", serde_json::to_string(&report)?);
    }

    client.close();
    Ok(())
}

/// Executes the `watch` subcommand.
async fn run_watch(args: WatchArgs) -> Result<()> {
    validate_endpoints(&args.servers)?;

    let interval = Duration::from_millis(args.ping_interval_ms);
    let registry = ServerRegistry::new();
    let mut heartbeater = HeartBeater::new(
        TcpRouter::new(),
        registry.clone(),
        HeartBeatConfig { ping_interval: interval },
        Arc::new(MonotonicClock::new()),
        args.identity,
    )?;
    for endpoint in &args.servers {
        heartbeater.watch(endpoint)?;
    }
    let task = heartbeater.spawn();

    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;

    let mut reported = 0;
    while args.cycles.map_or(true, |cycles| reported < cycles) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
        for server in registry.snapshot() {
            println!("{}", serde_json::to_string(&ServerStatus::from(server.as_ref()))?);
        }
        reported += 1;
    }

    task.abort();
    Ok(())
}
