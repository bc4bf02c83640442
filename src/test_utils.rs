//! Shared test utilities for fundkeeper.
//!
//! This module provides common helper functions for setting up test databases
//! and ledgers, and building transactions with sensible defaults.

use crate::{
    config::{LedgerSettings, database::create_tables},
    core::{
        Ledger, ManualClock, NewTransaction, TransactionChanges, account,
        reconcile::computed_balance,
    },
    entities::{Division, TransactionKind, account::Model as AccountModel},
    errors::{Error, Result},
    money::Money,
};
use chrono::{TimeZone, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;

pub use crate::core::clock::Clock;

/// Owner used by most tests.
pub const OWNER: &str = "owner-1";
/// A second owner for isolation checks.
pub const OTHER_OWNER: &str = "owner-2";

/// Installs a test-friendly tracing subscriber. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
///
/// The pool holds a single connection: every pooled connection to
/// `sqlite::memory:` would otherwise open its own empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Sets up a ledger with default settings on a fresh database.
///
/// The returned clock starts at 2024-01-01 08:00:00 UTC and only moves when
/// the test moves it.
pub async fn setup_test_ledger() -> Result<(Ledger, Arc<ManualClock>)> {
    setup_test_ledger_with(LedgerSettings::default()).await
}

/// Same as [`setup_test_ledger`] with custom settings.
pub async fn setup_test_ledger_with(
    settings: LedgerSettings,
) -> Result<(Ledger, Arc<ManualClock>)> {
    init_test_tracing();
    let db = setup_test_db().await?;
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
        .single()
        .ok_or_else(|| Error::validation("invalid test start time"))?;
    let clock = Arc::new(ManualClock::new(start));
    let ledger = Ledger::with_clock(db, settings, Arc::clone(&clock) as Arc<dyn Clock>)?;
    Ok((ledger, clock))
}

/// Creates an account with a zero balance.
pub async fn create_test_account(
    ledger: &Ledger,
    owner_id: &str,
    name: &str,
) -> Result<AccountModel> {
    ledger.create_account(owner_id, name, Money::ZERO).await
}

/// Builds an income of `major` whole units.
///
/// # Defaults
/// * `category`: "Food"
/// * `division`: Personal
#[must_use]
pub fn income(account_id: i64, major: i64) -> NewTransaction {
    NewTransaction {
        account_id,
        kind: TransactionKind::Income,
        amount: Money::from_major(major),
        category: "Food".to_string(),
        division: Division::Personal,
        description: None,
        occurred_at: None,
    }
}

/// Builds an expense of `major` whole units, with the same defaults as [`income`].
#[must_use]
pub fn expense(account_id: i64, major: i64) -> NewTransaction {
    NewTransaction {
        kind: TransactionKind::Expense,
        ..income(account_id, major)
    }
}

/// A change that only sets the amount.
#[must_use]
pub fn amount_change(major: i64) -> TransactionChanges {
    TransactionChanges {
        amount: Some(Money::from_major(major)),
        ..Default::default()
    }
}

/// Asserts that the stored balance equals the signed sum of the account's
/// transactions and transfers.
pub async fn assert_balance_matches_history(
    ledger: &Ledger,
    owner_id: &str,
    account_id: i64,
) -> Result<()> {
    let account = account::find_account(ledger.db(), owner_id, account_id).await?;
    let computed = computed_balance(ledger.db(), &account, true).await?;
    assert_eq!(
        account.balance, computed,
        "account {account_id} balance drifted from its history"
    );
    assert!(!account.balance.is_negative());
    Ok(())
}
