//! `finance-sweep` - materializes every due recurring template once.
//!
//! Meant to be run from cron. Reads `.env`, `DATABASE_URL`, `FINANCE_CONFIG` and
//! `RUST_LOG`.

use dotenvy::dotenv;
use finance_tracker::{
    config::{database, settings},
    core::{clock::SystemClock, processor},
    errors::Result,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Settings and database
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    settings::seed_exchange_rates(&db, &settings).await?;

    // 4. Sweep
    let report = processor::process_all_due(&db, &SystemClock).await?;
    for message in &report.errors {
        warn!("{message}");
    }
    info!(
        processed = report.processed,
        created = report.created,
        failed = report.errors.len(),
        "Sweep complete"
    );

    Ok(())
}
