//! Transfer business logic - moving funds between two of an owner's accounts.
//!
//! A transfer debits one account, credits the other and writes the transfer
//! record in one database transaction, holding both account locks for the
//! whole operation.

use crate::{
    core::{Ledger, account, transaction::normalize_description},
    entities::{Transfer, account as account_entity, transfer},
    errors::{Error, Result},
    money::Money,
};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Longest description accepted on a transfer, in characters.
pub const MAX_TRANSFER_DESCRIPTION_LEN: usize = 200;

/// Input for a transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: Money,
    pub description: Option<String>,
}

/// A committed transfer with both accounts as they stood right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub transfer: transfer::Model,
    pub from_account: account_entity::Model,
    pub to_account: account_entity::Model,
}

/// A transfer as listed to its owner. Account names are `None` once the
/// account has been deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferView {
    pub transfer: transfer::Model,
    pub from_account_name: Option<String>,
    pub to_account_name: Option<String>,
}

/// Transfers touching `account_id` in either direction, oldest first.
pub async fn transfers_for_account<C>(
    conn: &C,
    owner_id: &str,
    account_id: i64,
) -> Result<Vec<transfer::Model>>
where
    C: ConnectionTrait,
{
    Transfer::find()
        .filter(transfer::Column::OwnerId.eq(owner_id))
        .filter(
            Condition::any()
                .add(transfer::Column::FromAccountId.eq(account_id))
                .add(transfer::Column::ToAccountId.eq(account_id)),
        )
        .order_by_asc(transfer::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Rewrites a failed debit of the source account as a transfer error.
fn source_shortfall(err: Error) -> Error {
    match err {
        Error::InsufficientFunds { current, required } => {
            Error::InsufficientBalance { current, required }
        }
        other => other,
    }
}

impl Ledger {
    /// Moves `amount` from one of the owner's accounts to another.
    ///
    /// # Errors
    /// - `InvalidAmount` if the amount is not positive
    /// - `SameAccount` if both ends are the same account
    /// - `Validation` for an overlong description
    /// - `NotFound` if either account is absent or foreign
    /// - `InsufficientBalance` if the source holds less than `amount`
    #[instrument(skip(self))]
    pub async fn transfer(&self, owner_id: &str, new: NewTransfer) -> Result<TransferReceipt> {
        let amount = new.amount.ensure_positive()?;
        if new.from_account_id == new.to_account_id {
            return Err(Error::SameAccount {
                account_id: new.from_account_id,
            });
        }
        let description =
            normalize_description(new.description.as_deref(), MAX_TRANSFER_DESCRIPTION_LEN)?;

        let _guard = self
            .locks()
            .acquire(&[new.from_account_id, new.to_account_id])
            .await?;
        let now = self.now();
        let txn = self.db().begin().await?;

        let source = account::find_account(&txn, owner_id, new.from_account_id).await?;
        account::find_account(&txn, owner_id, new.to_account_id).await?;
        if source.balance < amount {
            return Err(Error::InsufficientBalance {
                current: source.balance,
                required: amount,
            });
        }

        let from_account = account::adjust_balance(&txn, owner_id, source.id, -amount)
            .await
            .map_err(source_shortfall)?;
        let to_account = account::adjust_balance(&txn, owner_id, new.to_account_id, amount).await?;

        let transfer = transfer::ActiveModel {
            owner_id: Set(owner_id.to_string()),
            from_account_id: Set(from_account.id),
            to_account_id: Set(to_account.id),
            amount: Set(amount),
            description: Set(description),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(
            "Transferred {} from account {} to account {} (transfer {})",
            amount, from_account.id, to_account.id, transfer.id
        );
        Ok(TransferReceipt {
            transfer,
            from_account,
            to_account,
        })
    }

    /// The owner's transfers, newest first.
    pub async fn list_transfers(&self, owner_id: &str) -> Result<Vec<TransferView>> {
        let transfers = Transfer::find()
            .filter(transfer::Column::OwnerId.eq(owner_id))
            .order_by_desc(transfer::Column::CreatedAt)
            .order_by_desc(transfer::Column::Id)
            .all(self.db())
            .await?;

        let names: HashMap<i64, String> = account::accounts_for_owner(self.db(), owner_id)
            .await?
            .into_iter()
            .map(|account| (account.id, account.name))
            .collect();

        Ok(transfers
            .into_iter()
            .map(|transfer| TransferView {
                from_account_name: names.get(&transfer.from_account_id).cloned(),
                to_account_name: names.get(&transfer.to_account_id).cloned(),
                transfer,
            })
            .collect())
    }
}
