//! Transaction records - the record-only half of transaction handling.
//!
//! Functions here create, read, update and delete transaction rows scoped to
//! `(id, owner_id)`, and enforce the edit window on updates and gated deletes.
//! They never touch account balances; [`crate::core::ledger`] pairs each write
//! with the matching balance adjustment inside one database transaction.
//! Every function is generic over `ConnectionTrait` so it can run either on a
//! plain connection or inside an open `DatabaseTransaction`.

use crate::{
    core::Ledger,
    entities::{Account, Division, Transaction, TransactionKind, transaction},
    errors::{Error, Result},
    money::Money,
};
use chrono::TimeDelta;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde::Serialize;
use std::collections::HashMap;

/// Longest description accepted on a transaction, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Input for recording a new transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub account_id: i64,
    pub kind: TransactionKind,
    pub amount: Money,
    pub category: String,
    pub division: Division,
    pub description: Option<String>,
    /// Defaults to the creation time when absent
    pub occurred_at: Option<DateTimeUtc>,
}

impl NewTransaction {
    /// Checks the amount, category and description, returning a trimmed copy.
    pub fn validated(self) -> Result<Self> {
        Ok(Self {
            amount: self.amount.ensure_positive()?,
            category: normalize_category(&self.category)?,
            description: normalize_description(self.description.as_deref(), MAX_DESCRIPTION_LEN)?,
            ..self
        })
    }
}

/// A partial update to a transaction. `None` leaves a field as it is.
///
/// The owning account is deliberately absent: it never changes after the
/// balance effect has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub kind: Option<TransactionKind>,
    pub amount: Option<Money>,
    pub category: Option<String>,
    pub division: Option<Division>,
    /// `Some("")` clears the description
    pub description: Option<String>,
}

impl TransactionChanges {
    /// Validates the changes and merges them over `current`.
    pub fn merged_with(&self, current: &transaction::Model) -> Result<transaction::Model> {
        let mut merged = current.clone();
        if let Some(kind) = self.kind {
            merged.kind = kind;
        }
        if let Some(amount) = self.amount {
            merged.amount = amount.ensure_positive()?;
        }
        if let Some(category) = &self.category {
            merged.category = normalize_category(category)?;
        }
        if let Some(division) = self.division {
            merged.division = division;
        }
        if let Some(description) = &self.description {
            merged.description = normalize_description(Some(description), MAX_DESCRIPTION_LEN)?;
        }
        Ok(merged)
    }

    /// True when applying these changes cannot move the account balance.
    #[must_use]
    pub fn is_balance_neutral(&self, current: &transaction::Model) -> bool {
        self.kind.is_none_or(|kind| kind == current.kind)
            && self.amount.is_none_or(|amount| amount == current.amount)
    }
}

/// Filters for [`Ledger::list_transactions`]. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub account_id: Option<i64>,
    pub kind: Option<TransactionKind>,
    pub category: Option<String>,
    pub division: Option<Division>,
    /// Inclusive lower bound on `occurred_at`
    pub occurred_from: Option<DateTimeUtc>,
    /// Inclusive upper bound on `occurred_at`
    pub occurred_to: Option<DateTimeUtc>,
}

/// A transaction as shown to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    pub transaction: transaction::Model,
    /// `None` only if the account vanished between the two reads
    pub account_name: Option<String>,
    /// Computed from the clock at read time
    pub editable: bool,
}

pub(crate) fn normalize_category(category: &str) -> Result<String> {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Category is required"));
    }
    Ok(trimmed.to_string())
}

/// Trims a description, mapping blank text to `None` and rejecting text
/// longer than `max_len` characters.
pub(crate) fn normalize_description(
    description: Option<&str>,
    max_len: usize,
) -> Result<Option<String>> {
    let Some(trimmed) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > max_len {
        return Err(Error::validation(format!(
            "Description cannot exceed {max_len} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Fails with `EditWindowExpired` once `now` has left the edit window.
pub fn ensure_editable(
    transaction: &transaction::Model,
    now: DateTimeUtc,
    window: TimeDelta,
) -> Result<()> {
    if transaction.is_editable(now, window) {
        Ok(())
    } else {
        Err(Error::EditWindowExpired {
            transaction_id: transaction.id,
            created_at: transaction.created_at,
        })
    }
}

/// Inserts a validated transaction record stamped with `now`.
pub async fn insert_transaction<C>(
    conn: &C,
    owner_id: &str,
    new: &NewTransaction,
    now: DateTimeUtc,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let model = transaction::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        account_id: Set(new.account_id),
        kind: Set(new.kind),
        amount: Set(new.amount),
        category: Set(new.category.clone()),
        division: Set(new.division),
        description: Set(new.description.clone()),
        occurred_at: Set(new.occurred_at.unwrap_or(now)),
        created_at: Set(now),
        ..Default::default()
    };
    model.insert(conn).await.map_err(Into::into)
}

/// Finds a transaction owned by `owner_id`.
pub async fn find_transaction<C>(
    conn: &C,
    owner_id: &str,
    transaction_id: i64,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("Transaction", transaction_id))
}

/// Applies `changes` to an already loaded transaction, provided it is still
/// editable at `now`.
pub async fn update_transaction<C>(
    conn: &C,
    current: &transaction::Model,
    changes: &TransactionChanges,
    now: DateTimeUtc,
    window: TimeDelta,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    ensure_editable(current, now, window)?;
    let merged = changes.merged_with(current)?;

    let mut active: transaction::ActiveModel = current.clone().into();
    active.kind = Set(merged.kind);
    active.amount = Set(merged.amount);
    active.category = Set(merged.category);
    active.division = Set(merged.division);
    active.description = Set(merged.description);

    active.update(conn).await.map_err(Into::into)
}

/// Deletes a transaction, provided it is still editable at `now`.
pub async fn delete_transaction<C>(
    conn: &C,
    owner_id: &str,
    transaction_id: i64,
    now: DateTimeUtc,
    window: TimeDelta,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let current = find_transaction(conn, owner_id, transaction_id).await?;
    ensure_editable(&current, now, window)?;
    remove_transaction(conn, owner_id, transaction_id).await
}

/// Deletes a transaction regardless of its age, returning the removed row.
pub async fn remove_transaction<C>(
    conn: &C,
    owner_id: &str,
    transaction_id: i64,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let current = find_transaction(conn, owner_id, transaction_id).await?;
    let result = Transaction::delete_many()
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::OwnerId.eq(owner_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("Transaction", transaction_id));
    }
    Ok(current)
}

/// All transactions recorded against an account, oldest first.
pub async fn transactions_for_account<C>(
    conn: &C,
    owner_id: &str,
    account_id: i64,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::OwnerId.eq(owner_id))
        .filter(transaction::Column::AccountId.eq(account_id))
        .order_by_asc(transaction::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

impl Ledger {
    /// Fetches one transaction with its account name and editability.
    pub async fn get_transaction(&self, owner_id: &str, transaction_id: i64) -> Result<TransactionView> {
        let transaction = find_transaction(self.db(), owner_id, transaction_id).await?;
        let account_name = Account::find_by_id(transaction.account_id)
            .one(self.db())
            .await?
            .map(|account| account.name);
        Ok(self.view(transaction, account_name))
    }

    /// Lists the owner's transactions matching `filter`, newest first.
    pub async fn list_transactions(
        &self,
        owner_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionView>> {
        let mut query = Transaction::find().filter(transaction::Column::OwnerId.eq(owner_id));
        if let Some(account_id) = filter.account_id {
            query = query.filter(transaction::Column::AccountId.eq(account_id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(transaction::Column::Kind.eq(kind));
        }
        if let Some(category) = &filter.category {
            query = query.filter(transaction::Column::Category.eq(category.trim()));
        }
        if let Some(division) = filter.division {
            query = query.filter(transaction::Column::Division.eq(division));
        }
        if let Some(from) = filter.occurred_from {
            query = query.filter(transaction::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.occurred_to {
            query = query.filter(transaction::Column::OccurredAt.lte(to));
        }

        let transactions = query
            .order_by_desc(transaction::Column::CreatedAt)
            .order_by_desc(transaction::Column::Id)
            .all(self.db())
            .await?;

        let names: HashMap<i64, String> = crate::core::account::accounts_for_owner(self.db(), owner_id)
            .await?
            .into_iter()
            .map(|account| (account.id, account.name))
            .collect();

        Ok(transactions
            .into_iter()
            .map(|transaction| {
                let account_name = names.get(&transaction.account_id).cloned();
                self.view(transaction, account_name)
            })
            .collect())
    }

    /// Distinct categories the owner has used, alphabetically.
    pub async fn categories(&self, owner_id: &str) -> Result<Vec<String>> {
        Transaction::find()
            .select_only()
            .column(transaction::Column::Category)
            .distinct()
            .filter(transaction::Column::OwnerId.eq(owner_id))
            .order_by_asc(transaction::Column::Category)
            .into_tuple::<String>()
            .all(self.db())
            .await
            .map_err(Into::into)
    }

    pub(crate) fn view(
        &self,
        transaction: transaction::Model,
        account_name: Option<String>,
    ) -> TransactionView {
        let editable = transaction.is_editable(self.now(), self.settings().edit_window());
        TransactionView {
            transaction,
            account_name,
            editable,
        }
    }
}
