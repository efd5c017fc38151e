//! Vigil Node binary
//!
//! Incident credibility, moderation and real-time fan-out service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_node::{Node, NodeConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_node=info,vigil_broker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vigil Node");

    let config = NodeConfig::from_env()?;

    let node = Node::new(config)?;
    node.run().await?;

    Ok(())
}
