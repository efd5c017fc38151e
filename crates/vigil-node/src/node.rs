//! Vigil Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with one shared record store
//! - HTTP API and WebSocket fan-out for clients
//! - Unix admin socket for local operator commands (vigil-admin CLI)
//! - Background orphan sweep

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::records::DEFAULT_STORE_TIMEOUT;
use crate::storage::{MemoryStore, RecordStore, RocksStore};
use crate::sweep::spawn_sweeper;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use vigil_broker::{Broker, DEFAULT_SUBSCRIBER_BUFFER};

/// Which record store backs the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    RocksDb,
    /// Nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Ok(StoreBackend::RocksDb),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("unknown store backend {other:?}"))),
        }
    }
}

/// Configuration for a Vigil node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for vigil-admin CLI)
    pub admin_socket: PathBuf,

    pub store: StoreBackend,

    /// Bound on one record store round-trip
    pub store_timeout: Duration,

    /// Orphan sweep period; `None` disables the sweeper
    pub sweep_interval: Option<Duration>,

    /// Per-connection event queue length
    pub subscriber_buffer: usize,

    /// WebSocket heartbeat period
    pub heartbeat_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./vigil-data");
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreBackend::RocksDb,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            sweep_interval: Some(Duration::from_secs(300)),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {name}={value:?}: {e}")))
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = lookup("VIGIL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = match lookup("VIGIL_API_ADDR") {
            Some(v) => parse_var("VIGIL_API_ADDR", &v)?,
            None => defaults.api_addr,
        };

        let admin_socket = lookup("VIGIL_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let store = match lookup("VIGIL_STORE") {
            Some(v) => v.parse()?,
            None => defaults.store,
        };

        let store_timeout = match lookup("VIGIL_STORE_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(parse_var("VIGIL_STORE_TIMEOUT_MS", &v)?),
            None => defaults.store_timeout,
        };
        if store_timeout.is_zero() {
            return Err(Error::Config("VIGIL_STORE_TIMEOUT_MS must be positive".into()));
        }

        let sweep_interval = match lookup("VIGIL_SWEEP_SECS") {
            Some(v) => match parse_var::<u64>("VIGIL_SWEEP_SECS", &v)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => defaults.sweep_interval,
        };

        let subscriber_buffer = match lookup("VIGIL_SUBSCRIBER_BUFFER") {
            Some(v) => parse_var("VIGIL_SUBSCRIBER_BUFFER", &v)?,
            None => defaults.subscriber_buffer,
        };
        if subscriber_buffer == 0 {
            return Err(Error::Config("VIGIL_SUBSCRIBER_BUFFER must be positive".into()));
        }

        let heartbeat_interval = match lookup("VIGIL_HEARTBEAT_SECS") {
            Some(v) => Duration::from_secs(parse_var("VIGIL_HEARTBEAT_SECS", &v)?),
            None => defaults.heartbeat_interval,
        };
        if heartbeat_interval.is_zero() {
            return Err(Error::Config("VIGIL_HEARTBEAT_SECS must be positive".into()));
        }

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            store,
            store_timeout,
            sweep_interval,
            subscriber_buffer,
            heartbeat_interval,
        })
    }
}

/// Shared state for the node - one engine shared by all components.
pub struct NodeState {
    pub engine: Engine,
    pub config: NodeConfig,
}

impl NodeState {
    /// Open the configured record store and assemble the engine.
    pub fn open(config: NodeConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.store {
            StoreBackend::RocksDb => {
                std::fs::create_dir_all(&config.data_dir)?;
                Arc::new(RocksStore::open(config.data_dir.join("records"))?)
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(store, config))
    }

    /// Memory-backed state regardless of `config.store`.
    pub fn in_memory(config: NodeConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    fn with_store(store: Arc<dyn RecordStore>, config: NodeConfig) -> Self {
        let broker = Broker::new(config.subscriber_buffer);
        let engine = Engine::new(store, broker, config.store_timeout);
        Self { engine, config }
    }
}

/// A Vigil node instance.
pub struct Node {
    state: Arc<NodeState>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        Ok(Self {
            state: Arc::new(NodeState::open(config)?),
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts HTTP server, admin socket and orphan sweeper).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Vigil node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Store: {:?} at {:?}", config.store, config.data_dir);

        let admin_socket = AdminSocket::new(self.state.engine.clone(), config.admin_socket.clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let sweeper = match config.sweep_interval {
            Some(every) => {
                tracing::info!("  Orphan sweep every {:?}", every);
                Some(spawn_sweeper(self.state.engine.clone(), every))
            }
            None => None,
        };

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("Vigil node stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
