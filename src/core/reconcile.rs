//! Balance reconciliation - recomputes stored balances from history.
//!
//! This is a maintenance pass, not part of the request path. Each account is
//! handled under its own lock and database transaction, so every single
//! correction is atomic, but the batch as a whole is not a snapshot.

use crate::{
    config::ReconcileSettings,
    core::{Ledger, account, transaction::transactions_for_account, transfer::transfers_for_account},
    entities::account as account_entity,
    errors::{Error, Result},
    money::Money,
};
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// What reconciliation found for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub account_id: i64,
    pub owner_id: String,
    pub account_name: String,
    pub old_balance: Money,
    pub computed_balance: Money,
    /// True only when the stored balance was actually overwritten
    pub corrected: bool,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn drifted(&self) -> bool {
        self.old_balance != self.computed_balance
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
    #[must_use]
    pub fn checked(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn drifted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.drifted()).count()
    }

    #[must_use]
    pub fn corrected(&self) -> usize {
        self.outcomes.iter().filter(|o| o.corrected).count()
    }
}

/// Sums an account's history: signed transactions, plus transfers in and out
/// when `include_transfers` is set.
pub async fn computed_balance<C>(
    conn: &C,
    account: &account_entity::Model,
    include_transfers: bool,
) -> Result<Money>
where
    C: ConnectionTrait,
{
    let mut total = Money::ZERO;
    for transaction in transactions_for_account(conn, &account.owner_id, account.id).await? {
        total = total.try_add(transaction.signed_amount())?;
    }
    if include_transfers {
        for transfer in transfers_for_account(conn, &account.owner_id, account.id).await? {
            total = total.try_add(transfer.signed_amount_for(account.id))?;
        }
    }
    Ok(total)
}

impl Ledger {
    /// Reconciles every account of every owner.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let accounts = account::all_accounts(self.db()).await?;
        let mut report = ReconcileReport::default();
        for account in accounts {
            // Accounts deleted since the listing are simply skipped.
            if let Some(outcome) = self.reconcile_one(&account.owner_id, account.id).await? {
                report.outcomes.push(outcome);
            }
        }
        info!(
            "Reconciliation checked {} accounts, {} drifted, {} corrected",
            report.checked(),
            report.drifted(),
            report.corrected()
        );
        Ok(report)
    }

    /// Reconciles one of the owner's accounts.
    pub async fn reconcile_account(&self, owner_id: &str, account_id: i64) -> Result<ReconcileOutcome> {
        match self.reconcile_one(owner_id, account_id).await? {
            Some(outcome) => Ok(outcome),
            None => Err(Error::not_found("Account", account_id)),
        }
    }

    async fn reconcile_one(&self, owner_id: &str, account_id: i64) -> Result<Option<ReconcileOutcome>> {
        let ReconcileSettings {
            include_transfers,
            dry_run,
        } = self.settings().reconcile;

        let _guard = self.locks().acquire(&[account_id]).await?;
        let txn = self.db().begin().await?;

        let account = match account::find_account(&txn, owner_id, account_id).await {
            Ok(account) => account,
            Err(Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let computed = computed_balance(&txn, &account, include_transfers).await?;

        let mut corrected = false;
        if computed != account.balance {
            if computed.is_negative() {
                warn!(
                    "Account {} history sums to {}, leaving stored balance {}",
                    account.id, computed, account.balance
                );
            } else if dry_run {
                info!(
                    "Account {} would be corrected from {} to {}",
                    account.id, account.balance, computed
                );
            } else {
                account::overwrite_balance(&txn, account.id, computed).await?;
                corrected = true;
                warn!(
                    "Corrected account {} balance from {} to {}",
                    account.id, account.balance, computed
                );
            }
        }
        txn.commit().await?;

        Ok(Some(ReconcileOutcome {
            account_id: account.id,
            owner_id: account.owner_id,
            account_name: account.name,
            old_balance: account.balance,
            computed_balance: computed,
            corrected,
        }))
    }
}
