use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plex_discovery::{Config, DiscoveryCoordinator, FileStore, StaticTokenAuth};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plex_discovery=info")),
        )
        .init();

    let config = Config::load()?;

    let token = std::env::var("PLEX_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
        .or_else(|| config.account.auth_token.clone())
        .context("No Plex token: set PLEX_TOKEN or account.auth_token in the config file")?;

    let store_path = config.storage.resolve_path()?;
    info!("Using state file {:?}", store_path);

    let coordinator = DiscoveryCoordinator::new(
        &config,
        Arc::new(StaticTokenAuth::new(token)),
        Arc::new(FileStore::new(store_path)),
    )?;

    coordinator
        .initialize()
        .await
        .context("Server discovery failed")?;

    if let Some(server_id) = std::env::args().nth(1)
        && !coordinator.select_server(&server_id).await
    {
        warn!("Could not connect to server {}", server_id);
    }

    let servers = coordinator.get_servers().await;
    println!("{} server(s)", servers.len());
    for server in servers.iter() {
        let owner = if server.owned {
            "owned".to_string()
        } else {
            format!("shared by {}", server.source_title)
        };
        println!(
            "  {} [{}] {} ({} connections)",
            server.name,
            server.id,
            owner,
            server.connections.len()
        );
    }

    match coordinator.get_selected_connection().await {
        Some(connection) => println!(
            "Active connection: {} ({}, {}ms)",
            connection.uri,
            connection.connection_type(),
            connection.latency_ms.unwrap_or_default()
        ),
        None => println!("No server selected"),
    }

    for (server_id, record) in coordinator.health_report() {
        println!(
            "  health {}: {} via {} at {}",
            server_id,
            record.status,
            record.connection_type,
            record.tested_at.to_rfc3339()
        );
    }

    Ok(())
}
