//! Command line and runtime configuration.
//!
//! The clap structs describe what an operator can pass on the command line;
//! `CoordinatorConfig` and `ReplicaConfig` are what the library consumes.

use crate::directory::{ReplicaIdentity, hash_to_64bit, types::parse_replica_id};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
/// How long a client waits for the coordinator. An aborting write can take a
/// full phase-1 timeout, a phase-2 attempt bounded by the same timeout and a
/// retry backoff step before the reply is sent, so this stays above
/// `2 * DEFAULT_TIMEOUT_MS` plus the largest backoff. A write queued behind
/// another transaction waits for that one too and can still run out.
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CACHE_SETS: usize = 16;
pub const DEFAULT_CACHE_SET_SIZE: usize = 8;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_DUMP_INTERVAL_SECS: u64 = 15;

/// Exponential backoff with jitter: 150ms doubling up to 1200ms, plus up to
/// 50ms of noise per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 150,
            max_ms: 1200,
            jitter_ms: 50,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            delay_ms: self.initial_ms,
            max_ms: self.max_ms,
            jitter_ms: self.jitter_ms,
        }
    }
}

/// Delay sequence produced by a `RetryPolicy`.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
}

impl Backoff {
    /// The delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::random::<u64>() % self.jitter_ms
        } else {
            0
        };
        let delay = Duration::from_millis(self.delay_ms + jitter);
        self.delay_ms = (self.delay_ms * 2).min(self.max_ms);
        delay
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Replicas that must register before any request is served.
    pub num_replicas: usize,
    pub cache_sets: usize,
    pub cache_set_size: usize,
    pub workers: usize,
    /// Bound on every phase-1, phase-2 and GET round trip.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            num_replicas: 2,
            cache_sets: DEFAULT_CACHE_SETS,
            cache_set_size: DEFAULT_CACHE_SET_SIZE,
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub id: u64,
    /// Hostname the coordinator should use to reach this replica.
    pub advertise_host: String,
    pub port: u16,
    pub cache_sets: usize,
    pub cache_set_size: usize,
    pub workers: usize,
    pub wal_path: PathBuf,
    pub store_path: PathBuf,
    pub dump_interval: Duration,
    /// Read timeout for inbound requests.
    pub timeout: Duration,
    pub registration_retry: RetryPolicy,
}

impl ReplicaConfig {
    pub fn new(advertise_host: &str, port: u16) -> Self {
        Self {
            id: default_replica_id(advertise_host, port),
            advertise_host: advertise_host.to_string(),
            port,
            cache_sets: DEFAULT_CACHE_SETS,
            cache_set_size: DEFAULT_CACHE_SET_SIZE,
            workers: DEFAULT_WORKERS,
            wal_path: PathBuf::from(format!("replica-{}.wal", port)),
            store_path: PathBuf::from(format!("replica-{}.json", port)),
            dump_interval: Duration::from_secs(DEFAULT_DUMP_INTERVAL_SECS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            registration_retry: RetryPolicy::default(),
        }
    }

    pub fn identity(&self) -> ReplicaIdentity {
        ReplicaIdentity::new(self.id, self.advertise_host.clone(), self.port)
    }
}

/// Ring position of a replica that was not given an explicit id.
pub fn default_replica_id(host: &str, port: u16) -> u64 {
    hash_to_64bit(&format!("{}:{}", host, port))
}

// ============================================================
// COMMAND LINE
// ============================================================

#[derive(Debug, Parser)]
#[command(name = "replikv", version, about = "Replicated key-value store with two-phase commit")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the 2PC coordinator.
    Coordinator(CoordinatorArgs),
    /// Run a storage replica and register it with a coordinator.
    Replica(ReplicaArgs),
    /// Run a single-node write-through server without replication.
    Server(ServerArgs),
    /// Send one request to a coordinator or standalone server.
    Client(ClientArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    #[arg(long, default_value_t = DEFAULT_CACHE_SETS)]
    pub cache_sets: usize,

    #[arg(long, default_value_t = DEFAULT_CACHE_SET_SIZE)]
    pub cache_set_size: usize,

    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

#[derive(Debug, Args)]
pub struct CoordinatorArgs {
    #[arg(long, env = "REPLIKV_REPLICAS", default_value_t = 2)]
    pub replicas: usize,

    #[arg(long, default_value = "127.0.0.1:8080")]
    pub client_addr: String,

    #[arg(long, default_value = "127.0.0.1:9090")]
    pub registration_addr: String,

    #[command(flatten)]
    pub cache: CacheArgs,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

impl CoordinatorArgs {
    pub fn to_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            num_replicas: self.replicas,
            cache_sets: self.cache.cache_sets,
            cache_set_size: self.cache.cache_set_size,
            workers: self.cache.workers,
            timeout: Duration::from_millis(self.timeout_ms),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ReplicaArgs {
    /// Ring id, signed or unsigned decimal. Defaults to the hash of host:port.
    #[arg(long, allow_hyphen_values = true)]
    pub id: Option<String>,

    #[arg(long, default_value = "127.0.0.1:9100")]
    pub listen: String,

    /// Hostname registered with the coordinator. Defaults to the listen host.
    #[arg(long)]
    pub advertise_host: Option<String>,

    #[arg(long, env = "REPLIKV_COORDINATOR", default_value = "127.0.0.1:9090")]
    pub coordinator: String,

    #[command(flatten)]
    pub cache: CacheArgs,

    #[arg(long)]
    pub wal: Option<PathBuf>,

    #[arg(long)]
    pub store: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_DUMP_INTERVAL_SECS)]
    pub dump_interval_secs: u64,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

impl ReplicaArgs {
    /// Builds the runtime config. `port` is the port actually bound, which
    /// differs from the requested one when listening on port 0.
    pub fn to_config(&self, port: u16) -> anyhow::Result<ReplicaConfig> {
        let host = match &self.advertise_host {
            Some(host) => host.clone(),
            None => split_host(&self.listen)?.to_string(),
        };

        let mut config = ReplicaConfig::new(&host, port);
        if let Some(raw) = &self.id {
            config.id = parse_replica_id(raw)
                .ok_or_else(|| anyhow::anyhow!("invalid replica id '{}'", raw))?;
        }
        config.cache_sets = self.cache.cache_sets;
        config.cache_set_size = self.cache.cache_set_size;
        config.workers = self.cache.workers;
        if let Some(wal) = &self.wal {
            config.wal_path = wal.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        config.dump_interval = Duration::from_secs(self.dump_interval_secs);
        config.timeout = Duration::from_millis(self.timeout_ms);
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: String,

    #[command(flatten)]
    pub cache: CacheArgs,

    #[arg(long, default_value = "server.json")]
    pub store: PathBuf,

    #[arg(long, default_value_t = DEFAULT_DUMP_INTERVAL_SECS)]
    pub dump_interval_secs: u64,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[arg(long, env = "REPLIKV_SERVER", default_value = "127.0.0.1:8080")]
    pub server: String,

    #[arg(long, default_value_t = DEFAULT_CLIENT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub op: ClientOp,
}

#[derive(Debug, Subcommand)]
pub enum ClientOp {
    Put { key: String, value: String },
    Get { key: String },
    Del { key: String },
}

/// Splits `"host:port"` into its parts.
pub fn split_address(addr: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("address '{}' is not host:port", addr))?;
    if host.is_empty() {
        anyhow::bail!("address '{}' has no host", addr);
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| anyhow::anyhow!("address '{}' has an invalid port", addr))?;
    Ok((host.to_string(), port))
}

fn split_host(addr: &str) -> anyhow::Result<&str> {
    addr.rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| anyhow::anyhow!("address '{}' is not host:port", addr))
}
