//! Development server: in-memory store, token table from the config file.
//!
//! ```text
//! cargo run -p noughts-server -- demos/noughts-server/config.toml
//! ```

use std::sync::Arc;

use noughts::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = ServerConfig::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    let gateway = config.token_table();
    if gateway.is_empty() {
        tracing::warn!("no [[users]] configured, every connection will be refused");
    }
    info!(bind = %config.bind_addr, users = gateway.len(), "starting noughts server");

    let server = NoughtsServer::builder()
        .config(config)
        .build(Arc::new(MemoryStore::new()), gateway)
        .await?;

    server.run().await?;
    Ok(())
}
