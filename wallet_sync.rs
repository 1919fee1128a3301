use alchemy_client::{AlchemyClient, AlchemyConfig};
use anyhow::Result;
use config_manager::SystemConfig;
use persistence_layer::{MemoryStore, PostgresClient};
use price_client::{DefiLlamaPriceClient, PriceClientConfig};
use std::sync::Arc;
use std::time::Duration;
use sync_engine::{SyncCollaborators, SyncSettings, SyncTarget, WalletSyncEngine};
use tracing::{error, info, warn};
use trade_core::{CursorStore, TracingProgress, TradeStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sync_engine=debug".into()),
        )
        .init();

    // Optional first argument: path to a config file (default config.toml)
    let config = match std::env::args().nth(1) {
        Some(path) => SystemConfig::load_from_path(path)?,
        None => SystemConfig::load()?,
    };
    if config.system.debug_mode {
        info!("Configuration: {}", config.to_redacted_json());
    }

    let targets = SyncTarget::from_config(&config.sync.wallets)?;
    if targets.is_empty() {
        warn!("No wallets configured under [sync].wallets, nothing to do");
        return Ok(());
    }
    info!("🚀 Starting wallet sync for {} wallet/chain targets", targets.len());

    let alchemy = Arc::new(AlchemyClient::new(AlchemyConfig::from(&config.alchemy))?);
    let prices = Arc::new(DefiLlamaPriceClient::new(PriceClientConfig::from(&config.pricing))?);

    let (trades, cursors): (Arc<dyn TradeStore>, Arc<dyn CursorStore>) = if config.database.enabled {
        let postgres = Arc::new(
            PostgresClient::new(&config.database.postgres_url, config.database.max_connections).await?,
        );
        postgres.health_check().await?;
        postgres.ensure_schema().await?;
        info!("✅ PostgreSQL ready");
        (postgres.clone() as Arc<dyn TradeStore>, postgres as Arc<dyn CursorStore>)
    } else {
        warn!("Database disabled: trades and cursors are kept in memory for this run only");
        let memory = Arc::new(MemoryStore::new());
        (memory.clone() as Arc<dyn TradeStore>, memory as Arc<dyn CursorStore>)
    };

    let collaborators = SyncCollaborators {
        transfers: alchemy.clone(),
        chain_tips: alchemy,
        prices,
        trades,
        cursors,
    };
    let engine = WalletSyncEngine::new(collaborators, SyncSettings::from_config(&config.sync)?)
        .with_progress(Arc::new(TracingProgress));

    let interval = Duration::from_secs(config.system.loop_interval_seconds);
    let continuous = config.system.continuous && !interval.is_zero();

    loop {
        let results = engine.sync_all(&targets).await;

        let mut failed = 0;
        for (target, result) in &results {
            match result {
                Ok(report) if report.had_failures() => {
                    warn!("⚠️ {} finished with skipped items: {}", target, report.summary())
                }
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    error!("❌ {} failed: {}", target, e);
                }
            }
        }

        if !continuous {
            if failed > 0 {
                anyhow::bail!("{} of {} sync targets failed", failed, results.len());
            }
            break;
        }

        info!("Next pass in {}s", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
