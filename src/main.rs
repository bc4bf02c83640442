//! `fundkeeper` reconciliation batch.
//!
//! Recomputes every account balance from its history, corrects drift, and
//! logs a summary. Meant to be run by an operator or a scheduler.

#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use fundkeeper::config::{database, settings};
use fundkeeper::core::Ledger;
use fundkeeper::errors::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load settings (config.toml is optional)
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    // 4. Connect and ensure tables exist
    let db = database::connect(&settings.database)
        .await
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Run the batch
    let ledger = Ledger::new(db, settings.ledger)?;
    if ledger.settings().reconcile.dry_run {
        info!("Dry run: no balances will be written");
    }
    let report = ledger.reconcile().await?;

    for outcome in report.outcomes.iter().filter(|o| o.drifted()) {
        warn!(
            "Account {} '{}' (owner {}): stored {}, history {}, corrected: {}",
            outcome.account_id,
            outcome.account_name,
            outcome.owner_id,
            outcome.old_balance,
            outcome.computed_balance,
            outcome.corrected
        );
    }
    info!(
        "Checked {} accounts: {} drifted, {} corrected",
        report.checked(),
        report.drifted(),
        report.corrected()
    );
    Ok(())
}
