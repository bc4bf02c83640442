/// Database connection and schema creation
pub mod database;

/// Ledger and database settings loaded from config.toml
pub mod settings;

pub use settings::{DatabaseSettings, LedgerSettings, ReconcileSettings, Settings};
