//! Transaction entity - A single income or expense entry against one account.
//!
//! Amounts are always positive; `kind` carries the direction. Whether a row may
//! still be edited is derived from `created_at` on every read and never stored.

use crate::money::Money;
use chrono::TimeDelta;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a transaction's effect on its account balance.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming into the account
    #[sea_orm(string_value = "income")]
    Income,
    /// Money leaving the account
    #[sea_orm(string_value = "expense")]
    Expense,
}

impl TransactionKind {
    /// The balance effect of `amount` under this kind: `+amount` for income,
    /// `-amount` for expense.
    #[must_use]
    pub fn signed(self, amount: Money) -> Money {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
        }
    }
}

/// Which side of the user's life a transaction belongs to.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Division {
    #[sea_orm(string_value = "office")]
    Office,
    #[sea_orm(string_value = "personal")]
    Personal,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Id of the user who owns the transaction
    #[sea_orm(indexed)]
    pub owner_id: String,
    /// Account whose balance this transaction affects; never changes
    #[sea_orm(indexed)]
    pub account_id: i64,
    /// Income or expense
    pub kind: TransactionKind,
    /// Always positive
    pub amount: Money,
    /// Free-text category (e.g., "Groceries")
    pub category: String,
    /// Office or personal
    pub division: Division,
    /// Optional note, at most 500 characters
    pub description: Option<String>,
    /// When the money actually moved, as reported by the user
    pub occurred_at: DateTimeUtc,
    /// When the record was created; drives the edit window
    pub created_at: DateTimeUtc,
}

impl Model {
    /// The effect this transaction has had on its account balance.
    #[must_use]
    pub fn signed_amount(&self) -> Money {
        self.kind.signed(self.amount)
    }

    /// True while `now` falls within `window` of `created_at`.
    #[must_use]
    pub fn is_editable(&self, now: DateTimeUtc, window: TimeDelta) -> bool {
        now.signed_duration_since(self.created_at) < window
    }
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
