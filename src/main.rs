use std::sync::Arc;

use fxdesk::config::EngineConfig;
use fxdesk::domain::repositories::settings_provider::SettingsProvider;
use fxdesk::domain::services::ledger_store::LedgerStore;
use fxdesk::persistence::init_database;
use fxdesk::persistence::settings_repository::SqliteSettings;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal outside development
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fxdesk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let calculator = config.calculator();
    info!(
        "fxdesk starting: database {}, money scale {}",
        config.database.url,
        calculator.scale()
    );

    let pool = init_database(&config.database).await?;

    let settings: Arc<dyn SettingsProvider> = Arc::new(SqliteSettings::new(
        pool.clone(),
        config.platform_commission_rate,
    ));
    let platform_rate = settings.platform_commission_rate().await?;
    if platform_rate != config.platform_commission_rate {
        info!(
            "Platform commission rate {}% from settings (configured default {}%)",
            platform_rate, config.platform_commission_rate
        );
    } else {
        info!("Platform commission rate {}%", platform_rate);
    }

    let audits = LedgerStore::new(pool.clone()).audit_all().await?;
    let inconsistent: Vec<_> = audits.iter().filter(|a| !a.is_consistent()).collect();

    pool.close().await;

    if inconsistent.is_empty() {
        info!("All {} cash balances are consistent", audits.len());
        return Ok(());
    }

    for audit in &inconsistent {
        warn!(
            "{}: stored {}, movements {:?}",
            audit.key, audit.stored_balance, audit.broken_movements
        );
    }
    error!(
        "{} of {} cash balances are inconsistent",
        inconsistent.len(),
        audits.len()
    );
    std::process::exit(1);
}
