//! Tradewinds room server
//!
//! Loads configuration and rules, then serves rooms over JSON lines on TCP.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tradewinds_core::{load_rules, RulesSource};
use tradewinds_server::{LineServer, MemoryStatsStore, MemoryStore, RoomHub, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("loading server config")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source = match &config.rules_dir {
        Some(dir) => RulesSource::Path(dir.clone()),
        None => RulesSource::Embedded,
    };
    let rules = load_rules(source).context("loading game rules")?;
    info!(nations = rules.nations.iter().count(), "rules loaded");

    let (hub, outbound) = RoomHub::new(
        Arc::new(rules),
        config.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStatsStore::new()),
    );

    let sweeper = hub.clone();
    let every = config.idle_sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sweeper.sweep_idle().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept idle rooms"),
                Err(err) => warn!(error = %err, "idle sweep failed"),
            }
        }
    });

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    info!("Tradewinds server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.bind_address);

    let server = Arc::new(LineServer::new(hub));
    server.spawn_router(outbound);
    server.serve(listener).await?;
    Ok(())
}
