//! Account business logic - account records and atomic balance mutation.
//!
//! The store functions are generic over `ConnectionTrait` so the ledger and
//! transfer code can call them inside an open `DatabaseTransaction`. Balance
//! changes go through [`adjust_balance`], a single conditional `UPDATE` that
//! refuses to take a balance below zero. It is the commit-time re-check behind
//! every pre-check the callers make.

use crate::{
    core::{
        Ledger,
        transaction::{self as transaction_store, NewTransaction},
    },
    entities::{Account, Division, Transaction, TransactionKind, account, transaction},
    errors::{Error, Result},
    money::Money,
};
use sea_orm::{QueryOrder, Set, SqlErr, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{info, instrument};

/// Longest account name accepted, in characters.
pub const MAX_ACCOUNT_NAME_LEN: usize = 50;

/// Category given to the income transaction that carries an opening balance.
pub const OPENING_BALANCE_CATEGORY: &str = "Opening balance";

/// Result of deleting an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDeletion {
    pub account: account::Model,
    pub deleted_transactions: u64,
}

fn normalize_account_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Account name is required"));
    }
    if trimmed.chars().count() > MAX_ACCOUNT_NAME_LEN {
        return Err(Error::validation(format!(
            "Account name cannot exceed {MAX_ACCOUNT_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Maps a unique-index violation on the account name to `NameConflict`.
fn name_conflict_or(err: DbErr, name: &str) -> Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => Error::NameConflict {
            name: name.to_string(),
        },
        _ => Error::Database(err),
    }
}

/// Finds an account owned by `owner_id`. Absent and foreign accounts are both
/// reported as `NotFound`.
pub async fn find_account<C>(conn: &C, owner_id: &str, account_id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    Account::find_by_id(account_id)
        .filter(account::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("Account", account_id))
}

/// Finds one of the owner's accounts by exact name.
pub async fn find_account_by_name<C>(
    conn: &C,
    owner_id: &str,
    name: &str,
) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::OwnerId.eq(owner_id))
        .filter(account::Column::Name.eq(name))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// All of the owner's accounts, newest first.
pub async fn accounts_for_owner<C>(conn: &C, owner_id: &str) -> Result<Vec<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::OwnerId.eq(owner_id))
        .order_by_desc(account::Column::CreatedAt)
        .order_by_desc(account::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Every account of every owner, by id. Used by batch reconciliation.
pub async fn all_accounts<C>(conn: &C) -> Result<Vec<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .order_by_asc(account::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Atomically adds `delta` to an account's balance.
///
/// This is one `UPDATE accounts SET balance = balance + delta WHERE id = ? AND
/// owner_id = ? AND balance >= -delta`. No read-modify-write happens in Rust,
/// so a concurrent writer can't slip in between the check and the write. When
/// no row matches, the account is re-read to tell a missing account
/// (`NotFound`) from a rejected debit (`InsufficientFunds`, carrying the
/// current balance and the amount the debit needed).
pub async fn adjust_balance<C>(
    conn: &C,
    owner_id: &str,
    account_id: i64,
    delta: Money,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let result = Account::update_many()
        .col_expr(
            account::Column::Balance,
            Expr::col(account::Column::Balance).add(delta.minor_units()),
        )
        .filter(account::Column::Id.eq(account_id))
        .filter(account::Column::OwnerId.eq(owner_id))
        .filter(account::Column::Balance.gte((-delta).minor_units()))
        .exec(conn)
        .await?;

    let account = find_account(conn, owner_id, account_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::InsufficientFunds {
            current: account.balance,
            required: -delta,
        });
    }
    Ok(account)
}

/// Replaces an account's stored balance outright. Only reconciliation uses this.
pub async fn overwrite_balance<C>(conn: &C, account_id: i64, balance: Money) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Account::update_many()
        .col_expr(account::Column::Balance, Expr::value(balance.minor_units()))
        .filter(account::Column::Id.eq(account_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("Account", account_id));
    }
    Ok(())
}

impl Ledger {
    /// Creates an account, recording any opening balance as an income
    /// transaction in the same database transaction.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        owner_id: &str,
        name: &str,
        opening_balance: Money,
    ) -> Result<account::Model> {
        let name = normalize_account_name(name)?;
        if !opening_balance.is_zero() {
            opening_balance.ensure_positive()?;
        }

        let now = self.now();
        let txn = self.db().begin().await?;

        if find_account_by_name(&txn, owner_id, &name).await?.is_some() {
            return Err(Error::NameConflict { name });
        }

        let mut account = account::ActiveModel {
            owner_id: Set(owner_id.to_string()),
            name: Set(name.clone()),
            balance: Set(Money::ZERO),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| name_conflict_or(e, &name))?;

        if opening_balance.is_positive() {
            let opening = NewTransaction {
                account_id: account.id,
                kind: TransactionKind::Income,
                amount: opening_balance,
                category: OPENING_BALANCE_CATEGORY.to_string(),
                division: Division::Personal,
                description: None,
                occurred_at: None,
            };
            transaction_store::insert_transaction(&txn, owner_id, &opening, now).await?;
            account = adjust_balance(&txn, owner_id, account.id, opening_balance).await?;
        }

        txn.commit().await?;
        info!(
            "Created account {} '{}' for owner {} with balance {}",
            account.id, account.name, owner_id, account.balance
        );
        Ok(account)
    }

    pub async fn get_account(&self, owner_id: &str, account_id: i64) -> Result<account::Model> {
        find_account(self.db(), owner_id, account_id).await
    }

    /// The owner's accounts, newest first.
    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<account::Model>> {
        accounts_for_owner(self.db(), owner_id).await
    }

    /// Renames an account, rejecting names already used by another of the
    /// owner's accounts.
    #[instrument(skip(self))]
    pub async fn rename_account(
        &self,
        owner_id: &str,
        account_id: i64,
        new_name: &str,
    ) -> Result<account::Model> {
        let new_name = normalize_account_name(new_name)?;
        let txn = self.db().begin().await?;

        let account = find_account(&txn, owner_id, account_id).await?;
        if account.name == new_name {
            return Ok(account);
        }
        if find_account_by_name(&txn, owner_id, &new_name).await?.is_some() {
            return Err(Error::NameConflict { name: new_name });
        }

        let mut active: account::ActiveModel = account.into();
        active.name = Set(new_name.clone());
        let renamed = active
            .update(&txn)
            .await
            .map_err(|e| name_conflict_or(e, &new_name))?;

        txn.commit().await?;
        info!("Renamed account {} to '{}'", renamed.id, renamed.name);
        Ok(renamed)
    }

    /// Deletes an account together with all of its transactions, atomically.
    ///
    /// Transfers that reference the account are kept as history.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, owner_id: &str, account_id: i64) -> Result<AccountDeletion> {
        let _guard = self.locks().acquire(&[account_id]).await?;
        let txn = self.db().begin().await?;

        let account = find_account(&txn, owner_id, account_id).await?;

        let deleted = Transaction::delete_many()
            .filter(transaction::Column::AccountId.eq(account_id))
            .filter(transaction::Column::OwnerId.eq(owner_id))
            .exec(&txn)
            .await?;

        Account::delete_many()
            .filter(account::Column::Id.eq(account_id))
            .filter(account::Column::OwnerId.eq(owner_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        info!(
            "Deleted account {} '{}' and {} transactions",
            account.id, account.name, deleted.rows_affected
        );
        Ok(AccountDeletion {
            account,
            deleted_transactions: deleted.rows_affected,
        })
    }
}
