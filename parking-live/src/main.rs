/**
 * PARKING LIVE - Point d'entrée headless
 *
 * RÔLE : Charge la config, branche le loader HTTP, le transport MQTT et une
 * vue qui rend le tableau de bord dans les logs, puis fait tourner une
 * session jusqu'à Ctrl-C.
 */

use anyhow::{Context, Result};
use parking_live::{load_config, HttpSnapshotLoader, LogView, MqttTransport, Session};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parking_live=info")),
        )
        .init();

    let cfg = load_config().await;
    info!(api = %cfg.api.base_url, broker = %format!("{}:{}", cfg.push.host, cfg.push.port), "parking-live starting");

    let loader = HttpSnapshotLoader::new(&cfg.api).context("failed to build HTTP client")?;
    let transport = MqttTransport::new(&cfg.push);
    let session = Session::new(cfg, Arc::new(loader), Box::new(transport), Box::new(LogView));
    let handle = session.handle();

    let running = tokio::spawn(session.run());

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    let stats = handle.link_stats();
    info!(reconnects = stats.reconnect_attempts, messages = stats.messages_received, "shutdown requested");
    handle.shutdown();
    running.await.context("session task panicked")?;

    Ok(())
}
