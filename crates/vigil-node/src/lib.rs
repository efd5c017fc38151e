//! Vigil - Incident Credibility & Moderation Engine
//!
//! Community members report local incidents, vote on their credibility,
//! discuss them and flag them as false; moderators adjudicate the flags.
//! Every state change is pushed to connected viewers through the
//! [`vigil_broker`] fan-out.
//!
//! # Architecture
//!
//! - **Models**: Incident, Vote, FalseReport, Comment
//! - **Storage**: `RecordStore` trait with RocksDB and in-memory backends
//! - **Ledgers**: votes ([`VoteLedger`]), false reports ([`ReportLedger`])
//! - **Moderation**: the Normal / Flagged / VerifiedFalse state machine
//! - **Lifecycle**: incident creation, listing and cascade deletion
//! - **Comments**: threaded discussion under an incident
//! - **API**: HTTP endpoints and the WebSocket fan-out endpoint
//! - **Admin Socket**: Unix socket for local operator commands (vigil-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use vigil_node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = Node::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod comments;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod models;
pub mod moderation;
pub mod node;
pub mod records;
pub mod reports;
pub mod storage;
pub mod sweep;
pub mod votes;
pub mod ws;

#[cfg(test)]
mod testing;

pub use comments::CommentBoard;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use identity::{Identity, Role};
pub use lifecycle::{IncidentFilter, IncidentManager, IncidentSummary};
pub use moderation::{Moderation, ModerationOutcome, ModerationState, Verdict};
pub use node::{Node, NodeConfig, NodeState, StoreBackend};
pub use records::Records;
pub use reports::ReportLedger;
pub use storage::{MemoryStore, RecordStore, RocksStore};
pub use sweep::{sweep_orphans, SweepReport};
pub use votes::VoteLedger;
