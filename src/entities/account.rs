//! Account entity - A named balance bucket owned by a single user.
//!
//! The stored `balance` is a cache of the net effect of every transaction and
//! transfer applied to the account. It is only ever changed through the ledger
//! and transfer operations, or overwritten by reconciliation.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Id of the user who owns the account, issued by the auth layer
    #[sea_orm(indexed)]
    pub owner_id: String,
    /// Human-readable name, unique per owner (e.g., "Cash", "Bank")
    pub name: String,
    /// Current balance, never negative at rest
    pub balance: Money,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
