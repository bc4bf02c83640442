//! Transfer entity - An immutable move of funds between two accounts of the
//! same owner.
//!
//! Transfers are history: no foreign keys are declared, so deleting one side's
//! account leaves the record in place for the other side's balance.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transfer database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub owner_id: String,
    /// Account debited by the transfer
    pub from_account_id: i64,
    /// Account credited by the transfer
    pub to_account_id: i64,
    /// Always positive
    pub amount: Money,
    /// Optional note, at most 200 characters
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// The effect this transfer had on `account_id`'s balance.
    #[must_use]
    pub fn signed_amount_for(&self, account_id: i64) -> Money {
        if account_id == self.from_account_id {
            -self.amount
        } else if account_id == self.to_account_id {
            self.amount
        } else {
            Money::ZERO
        }
    }
}

/// Transfers have no declared relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
