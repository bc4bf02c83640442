use crate::money::Money;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid amount: {input}")]
    InvalidAmount { input: String },

    /// Covers both "does not exist" and "belongs to someone else".
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Insufficient funds: current balance is {current}, required {required}")]
    InsufficientFunds { current: Money, required: Money },

    #[error("Insufficient balance in source account: current balance is {current}, required {required}")]
    InsufficientBalance { current: Money, required: Money },

    #[error("Transaction {transaction_id} can no longer be edited (created at {created_at})")]
    EditWindowExpired {
        transaction_id: i64,
        created_at: DateTime<Utc>,
    },

    #[error("Cannot transfer from account {account_id} to itself")]
    SameAccount { account_id: i64 },

    #[error("Account with name '{name}' already exists")]
    NameConflict { name: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Account lock table poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
