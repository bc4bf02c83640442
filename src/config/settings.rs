//! Settings loading from config.toml
//!
//! Every field has a default, so the file is optional and may be partial.
//!
//! ```toml
//! [database]
//! url = "sqlite://data/fundkeeper.sqlite?mode=rwc"
//! max_connections = 1
//!
//! [ledger]
//! edit_window_hours = 12
//! gate_deletes_by_edit_window = false
//!
//! [ledger.reconcile]
//! include_transfers = true
//! dry_run = false
//! ```

use crate::errors::{Error, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming an alternative settings file.
pub const CONFIG_PATH_ENV: &str = "FUNDKEEPER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Overrides `DATABASE_URL` when set
    pub url: Option<String>,
    /// Pool size; must be 1 for `SQLite`
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// Rejects a pool larger than one connection when the explicit URL
    /// points at `SQLite`.
    pub fn validate(&self) -> Result<()> {
        match &self.url {
            Some(url) => ensure_single_writer(url, self.max_connections),
            None => Ok(()),
        }
    }
}

/// `SQLite` pools must hold a single connection: deferred transactions on two
/// connections can both try to upgrade to a write lock and hit `SQLITE_BUSY`.
pub(crate) fn ensure_single_writer(url: &str, max_connections: u32) -> Result<()> {
    if url.starts_with("sqlite:") && max_connections > 1 {
        return Err(Error::Config {
            message: format!(
                "max_connections must be 1 for SQLite databases, got {max_connections}"
            ),
        });
    }
    Ok(())
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// How long after creation a transaction stays editable
    pub edit_window_hours: i64,
    /// Refuse to delete transactions once their edit window has closed
    pub gate_deletes_by_edit_window: bool,
    pub reconcile: ReconcileSettings,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            edit_window_hours: 12,
            gate_deletes_by_edit_window: false,
            reconcile: ReconcileSettings::default(),
        }
    }
}

impl LedgerSettings {
    #[must_use]
    pub fn edit_window(&self) -> TimeDelta {
        TimeDelta::hours(self.edit_window_hours)
    }

    /// Rejects settings the ledger cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.edit_window_hours <= 0 {
            return Err(Error::Config {
                message: format!(
                    "edit_window_hours must be positive, got {}",
                    self.edit_window_hours
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Count transfers in and out when recomputing a balance. Turning this off
    /// reproduces the transaction-only recount, which misreports any account
    /// with transfer history.
    pub include_transfers: bool,
    /// Report drift without writing corrections
    pub dry_run: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            include_transfers: true,
            dry_run: false,
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The database or ledger settings fail validation
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;

    parse_settings(&contents)
}

/// Parses and validates settings from TOML text
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    settings.database.validate()?;
    settings.ledger.validate()?;
    Ok(settings)
}

/// Loads settings from `$FUNDKEEPER_CONFIG`, or ./config.toml, falling back to
/// defaults when no file exists at that path.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        info!("No settings file at {}, using defaults", path);
        Ok(Settings::default())
    }
}
