//! Database configuration module for fundkeeper.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs. The one constraint entities cannot express, account names being
//! unique per owner, is added as a separate composite index.

use crate::config::{DatabaseSettings, settings::ensure_single_writer};
use crate::entities::{Account, AccountColumn, Transaction, Transfer};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/fundkeeper.sqlite?mode=rwc";

/// Name of the unique index backing per-owner account names.
pub const ACCOUNT_NAME_INDEX: &str = "idx_accounts_owner_name";

/// Resolves the database URL: explicit setting, then `DATABASE_URL`, then the
/// default local `SQLite` file.
#[must_use]
pub fn get_database_url(settings: &DatabaseSettings) -> String {
    settings.url.clone().unwrap_or_else(|| {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
    })
}

/// Opens a connection pool and ensures all tables exist.
///
/// `SQLite` URLs must be paired with `max_connections = 1`.
#[instrument(skip(settings))]
pub async fn connect(settings: &DatabaseSettings) -> Result<DatabaseConnection> {
    let url = get_database_url(settings);
    ensure_single_writer(&url, settings.max_connections)?;
    debug!("Connecting to database at {}", url);

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(settings.max_connections.max(1))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    create_tables(&db).await?;
    info!("Database connection opened and tables ensured");
    Ok(db)
}

/// Creates all tables and indexes if they do not already exist.
///
/// Accounts are created first so the transactions table can reference them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = [
        schema.create_table_from_entity(Account),
        schema.create_table_from_entity(Transaction),
        schema.create_table_from_entity(Transfer),
    ];
    for mut table in tables {
        table.if_not_exists();
        db.execute(builder.build(&table)).await?;
    }

    let indexes = [
        schema.create_index_from_entity(Account),
        schema.create_index_from_entity(Transaction),
        schema.create_index_from_entity(Transfer),
    ];
    for mut index in indexes.into_iter().flatten() {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }

    let unique_name = Index::create()
        .name(ACCOUNT_NAME_INDEX)
        .table(Account)
        .col(AccountColumn::OwnerId)
        .col(AccountColumn::Name)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&unique_name)).await?;

    Ok(())
}
