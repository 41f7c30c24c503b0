use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use pmoconfig::identifiers::read_identifiers;
use pmokodi::NodeIdentity;
use pmosync::{PoolCoordinator, SyncAlgorithm, SyncSettings};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            eprintln!("PMOSync: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // ========== PHASE 1 : Configuration ==========
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = pmoconfig::init_config(&config_dir)?;

    let level = config.get_log_min_level()?;
    if let Err(e) = pmosync::logs::init_logging(&level) {
        eprintln!("PMOSync: {}", e);
    }
    info!(config_dir = %config.directory(), "⚙️ Configuration loaded");

    let settings = SyncSettings::from_config(&config)?;
    info!(
        threshold = ?settings.threshold,
        interval = ?settings.check_interval,
        player_id = settings.player_id,
        "Sync settings"
    );

    // ========== PHASE 2 : Connexion aux nœuds ==========
    let identifiers_path = config.get_identifiers_path()?;
    let identities: Vec<NodeIdentity> = read_identifiers(&identifiers_path)?
        .into_iter()
        .map(|entry| NodeIdentity::new(entry.host, entry.user, entry.password))
        .collect();
    if identities.is_empty() {
        warn!(file = %identifiers_path.display(), "No node listed");
    }

    info!("📡 Connecting to {} node(s)...", identities.len());
    let pool = Arc::new(PoolCoordinator::new(settings));
    let connected = pool
        .connect_all(identities)
        .await
        .context("No Kodi node could be reached")?;
    info!("✅ {} node(s) connected", connected);

    // ========== PHASE 3 : Synchronisation ==========
    info!("▶️ Starting playback everywhere...");
    pool.play_all().await;

    let listener = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run_notification_listener().await }
    });
    let sync = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { SyncAlgorithm::new(pool).run().await }
    });

    info!("✅ PMOSync is ready!");
    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for Ctrl+C")?;

    info!("🛑 Shutting down...");
    pool.shutdown().await;
    for task in [listener, sync] {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }
    info!("👋 Bye");
    Ok(())
}
