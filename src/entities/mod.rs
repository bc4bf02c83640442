//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod transaction;
pub mod transfer;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use transaction::{
    Column as TransactionColumn, Division, Entity as Transaction, Model as TransactionModel,
    TransactionKind,
};
pub use transfer::{Column as TransferColumn, Entity as Transfer, Model as TransferModel};
