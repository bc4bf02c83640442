//! Ledger engine - keeps one account's balance consistent with one
//! transaction's effect.
//!
//! Each operation takes the account lock, opens a database transaction, and
//! writes the transaction record and the balance change together. Any error
//! returns before `commit`, and dropping the open `DatabaseTransaction` rolls
//! both writes back, so no other reader ever sees one without the other.

use crate::{
    config::LedgerSettings,
    core::{
        account,
        clock::{Clock, SystemClock},
        locks::AccountLocks,
        transaction::{self as transaction_store, NewTransaction, TransactionChanges, TransactionView},
    },
    entities::{TransactionKind, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Handle to the balance-consistency engine.
///
/// Cheap to clone; clones share the connection pool, clock and lock table.
/// The owner id is always an explicit argument, never ambient state.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    locks: AccountLocks,
    settings: LedgerSettings,
}

impl Ledger {
    /// Creates a ledger that reads the system clock.
    pub fn new(db: DatabaseConnection, settings: LedgerSettings) -> Result<Self> {
        Self::with_clock(db, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: DatabaseConnection,
        settings: LedgerSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            db,
            clock,
            locks: AccountLocks::new(),
            settings,
        })
    }

    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub(crate) const fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records an income or expense and applies it to the account balance.
    ///
    /// # Errors
    /// - `InvalidAmount` if the amount is not positive
    /// - `Validation` for a blank category or an overlong description
    /// - `NotFound` if the account is absent or belongs to someone else
    /// - `InsufficientFunds` if an expense exceeds the current balance
    #[instrument(skip(self))]
    pub async fn record_transaction(
        &self,
        owner_id: &str,
        new: NewTransaction,
    ) -> Result<TransactionView> {
        let new = new.validated()?;
        let _guard = self.locks.acquire(&[new.account_id]).await?;
        let now = self.now();
        let txn = self.db.begin().await?;

        let account = account::find_account(&txn, owner_id, new.account_id).await?;
        if new.kind == TransactionKind::Expense && account.balance < new.amount {
            return Err(Error::InsufficientFunds {
                current: account.balance,
                required: new.amount,
            });
        }

        let record = transaction_store::insert_transaction(&txn, owner_id, &new, now).await?;
        let account =
            account::adjust_balance(&txn, owner_id, account.id, record.signed_amount()).await?;

        txn.commit().await?;
        info!(
            "Recorded {:?} {} as transaction {} on account {}, balance now {}",
            record.kind, record.amount, record.id, account.id, account.balance
        );
        Ok(self.view(record, Some(account.name)))
    }

    /// Edits a transaction still inside its edit window.
    ///
    /// The old effect is reversed and the new one applied as a single net
    /// delta, checked once against the final balance. A change that would take
    /// the balance below zero (for instance flipping a large income to an
    /// expense) fails with `InsufficientFunds`. Edits that leave kind and amount
    /// alone only rewrite the record, still inside the database transaction.
    #[instrument(skip(self))]
    pub async fn edit_transaction(
        &self,
        owner_id: &str,
        transaction_id: i64,
        changes: TransactionChanges,
    ) -> Result<TransactionView> {
        let window = self.settings.edit_window();

        let existing = transaction_store::find_transaction(&self.db, owner_id, transaction_id).await?;
        transaction_store::ensure_editable(&existing, self.now(), window)?;

        let _guard = self.locks.acquire(&[existing.account_id]).await?;
        // The window is judged at the time the edit actually applies.
        let now = self.now();
        let txn = self.db.begin().await?;

        // Re-read under the lock; a concurrent delete shows up as NotFound here.
        let current = transaction_store::find_transaction(&txn, owner_id, transaction_id).await?;
        let neutral = changes.is_balance_neutral(&current);
        let updated =
            transaction_store::update_transaction(&txn, &current, &changes, now, window).await?;

        let delta = updated
            .signed_amount()
            .try_sub(current.signed_amount())?;
        let account = if delta.is_zero() {
            account::find_account(&txn, owner_id, current.account_id).await?
        } else {
            account::adjust_balance(&txn, owner_id, current.account_id, delta).await?
        };

        txn.commit().await?;
        if neutral {
            debug!("Updated fields of transaction {}", updated.id);
        } else {
            info!(
                "Edited transaction {} on account {} by net {}, balance now {}",
                updated.id, account.id, delta, account.balance
            );
        }
        Ok(self.view(updated, Some(account.name)))
    }

    /// Deletes a transaction and reverses its effect on the account.
    ///
    /// Deleting an expense only ever restores funds. Deleting an income whose
    /// amount has since been spent would leave a negative balance and fails
    /// with `InsufficientFunds`. The edit window does not apply unless
    /// `gate_deletes_by_edit_window` is set.
    #[instrument(skip(self))]
    pub async fn delete_transaction(
        &self,
        owner_id: &str,
        transaction_id: i64,
    ) -> Result<transaction::Model> {
        let existing = transaction_store::find_transaction(&self.db, owner_id, transaction_id).await?;

        let _guard = self.locks.acquire(&[existing.account_id]).await?;
        let now = self.now();
        let txn = self.db.begin().await?;

        let removed = if self.settings.gate_deletes_by_edit_window {
            transaction_store::delete_transaction(
                &txn,
                owner_id,
                transaction_id,
                now,
                self.settings.edit_window(),
            )
            .await?
        } else {
            transaction_store::remove_transaction(&txn, owner_id, transaction_id).await?
        };
        let account =
            account::adjust_balance(&txn, owner_id, removed.account_id, -removed.signed_amount())
                .await?;

        txn.commit().await?;
        info!(
            "Deleted transaction {} from account {}, balance now {}",
            removed.id, account.id, account.balance
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::Division;
    use crate::money::Money;
    use crate::test_utils::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_record_transaction_validation() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;

        let mut zero = income(cash.id, 1);
        zero.amount = Money::ZERO;
        let result = ledger.record_transaction(OWNER, zero).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = ledger.record_transaction(OWNER, income(999, 10)).await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "Account",
                id: 999
            })
        ));

        let result = ledger.record_transaction(OTHER_OWNER, income(cash.id, 10)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        assert_eq!(ledger.get_account(OWNER, cash.id).await?.balance, Money::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_are_invalid() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 1)).await?;

        let mut huge = income(cash.id, 1);
        huge.amount = Money::from_minor(i64::MAX);
        let result = ledger.record_transaction(OWNER, huge).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = ledger
            .edit_transaction(
                OWNER,
                view.transaction.id,
                TransactionChanges {
                    amount: Some(Money::from_minor(i64::MAX)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(1)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cash_scenario_rejects_overdraft() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;

        let view = ledger.record_transaction(OWNER, income(cash.id, 500)).await?;
        assert!(view.editable);
        assert_eq!(view.account_name.as_deref(), Some("Cash"));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );

        let result = ledger.record_transaction(OWNER, expense(cash.id, 600)).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds { current, required })
                if current == Money::from_major(500) && required == Money::from_major(600)
        ));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );

        // Spending exactly the balance is allowed.
        ledger.record_transaction(OWNER, expense(cash.id, 500)).await?;
        assert_eq!(ledger.get_account(OWNER, cash.id).await?.balance, Money::ZERO);
        assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_record_leaves_no_row() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;

        let _ = ledger.record_transaction(OWNER, expense(cash.id, 1)).await;
        let rows = transaction_store::transactions_for_account(ledger.db(), OWNER, cash.id).await?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_description_only_keeps_balance() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 500)).await?;

        let edited = ledger
            .edit_transaction(
                OWNER,
                view.transaction.id,
                TransactionChanges {
                    description: Some("March salary".to_string()),
                    category: Some("Salary".to_string()),
                    division: Some(Division::Office),
                    ..Default::default()
                },
            )
            .await?;

        assert_eq!(edited.transaction.description.as_deref(), Some("March salary"));
        assert_eq!(edited.transaction.category, "Salary");
        assert_eq!(edited.transaction.division, Division::Office);
        assert_eq!(edited.transaction.account_id, cash.id);
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_amount_moves_balance_by_difference() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let salary = ledger.record_transaction(OWNER, income(cash.id, 500)).await?;
        let lunch = ledger.record_transaction(OWNER, expense(cash.id, 100)).await?;

        // Income 500 -> 650 raises the balance by 150.
        ledger
            .edit_transaction(OWNER, salary.transaction.id, amount_change(650))
            .await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(550)
        );

        // Expense 100 -> 40 raises the balance by 60.
        ledger
            .edit_transaction(OWNER, lunch.transaction.id, amount_change(40))
            .await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(610)
        );

        assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_validates_only_final_balance() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        ledger.record_transaction(OWNER, income(cash.id, 100)).await?;
        let rent = ledger.record_transaction(OWNER, expense(cash.id, 100)).await?;

        // Reversal +100 then new effect -60: the intermediate +100 is never checked
        // on its own, and the final balance of 40 is fine.
        ledger
            .edit_transaction(OWNER, rent.transaction.id, amount_change(60))
            .await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(40)
        );

        // Raising the expense to 120 would end at -20.
        let result = ledger
            .edit_transaction(OWNER, rent.transaction.id, amount_change(120))
            .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds { current, required })
                if current == Money::from_major(40) && required == Money::from_major(60)
        ));
        let unchanged = ledger.get_transaction(OWNER, rent.transaction.id).await?;
        assert_eq!(unchanged.transaction.amount, Money::from_major(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_flipping_income_to_expense_is_checked() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let gift = ledger.record_transaction(OWNER, income(cash.id, 30)).await?;

        // Net delta -60 on a balance of 30.
        let result = ledger
            .edit_transaction(
                OWNER,
                gift.transaction.id,
                TransactionChanges {
                    kind: Some(TransactionKind::Expense),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        let still_income = ledger.get_transaction(OWNER, gift.transaction.id).await?;
        assert_eq!(still_income.transaction.kind, TransactionKind::Income);
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(30)
        );

        // With enough other funds the flip goes through: 30 + 100 - 60 = 70.
        ledger.record_transaction(OWNER, income(cash.id, 100)).await?;
        ledger
            .edit_transaction(
                OWNER,
                gift.transaction.id,
                TransactionChanges {
                    kind: Some(TransactionKind::Expense),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(70)
        );
        assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_rejects_invalid_amount() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 10)).await?;

        let result = ledger
            .edit_transaction(
                OWNER,
                view.transaction.id,
                TransactionChanges {
                    amount: Some(Money::ZERO),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_window_boundary() -> Result<()> {
        let (ledger, clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 10)).await?;
        let created = clock.now();

        clock.set(created + TimeDelta::hours(12) - TimeDelta::seconds(1));
        ledger
            .edit_transaction(OWNER, view.transaction.id, amount_change(11))
            .await?;

        clock.set(created + TimeDelta::hours(12));
        let result = ledger
            .edit_transaction(OWNER, view.transaction.id, amount_change(12))
            .await;
        assert!(matches!(
            result,
            Err(Error::EditWindowExpired { transaction_id, .. }) if transaction_id == view.transaction.id
        ));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(11)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_queued_past_window_is_rejected() -> Result<()> {
        let (ledger, clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 10)).await?;
        let created = clock.now();

        clock.set(created + TimeDelta::hours(12) - TimeDelta::seconds(1));
        let busy = ledger.locks().acquire(&[cash.id]).await?;

        let editor = ledger.clone();
        let transaction_id = view.transaction.id;
        let pending = tokio::spawn(async move {
            editor
                .edit_transaction(OWNER, transaction_id, amount_change(99))
                .await
        });

        // Let the edit pass its first window check and queue on the lock.
        while !pending.is_finished() && ledger.locks().contenders(cash.id)? < 2 {
            tokio::task::yield_now().await;
        }
        clock.advance(TimeDelta::hours(1));
        drop(busy);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::EditWindowExpired { .. })));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(10)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_unknown_or_foreign_transaction() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 10)).await?;

        let result = ledger
            .edit_transaction(OTHER_OWNER, view.transaction.id, amount_change(1))
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        let result = ledger.edit_transaction(OWNER, 999, amount_change(1)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        ledger.record_transaction(OWNER, income(cash.id, 500)).await?;
        let lunch = ledger.record_transaction(OWNER, expense(cash.id, 80)).await?;

        let removed = ledger.delete_transaction(OWNER, lunch.transaction.id).await?;
        assert_eq!(removed.id, lunch.transaction.id);
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );

        let result = ledger.delete_transaction(OWNER, lunch.transaction.id).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_ignores_edit_window_by_default() -> Result<()> {
        let (ledger, clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        ledger.record_transaction(OWNER, income(cash.id, 500)).await?;
        let old = ledger.record_transaction(OWNER, expense(cash.id, 80)).await?;

        clock.advance(TimeDelta::days(30));
        ledger.delete_transaction(OWNER, old.transaction.id).await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_gated_when_configured() -> Result<()> {
        let settings = LedgerSettings {
            gate_deletes_by_edit_window: true,
            ..LedgerSettings::default()
        };
        let (ledger, clock) = setup_test_ledger_with(settings).await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let view = ledger.record_transaction(OWNER, income(cash.id, 500)).await?;

        clock.advance(TimeDelta::hours(12));
        let result = ledger.delete_transaction(OWNER, view.transaction.id).await;
        assert!(matches!(result, Err(Error::EditWindowExpired { .. })));
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(500)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_spent_income_is_refused() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        let salary = ledger.record_transaction(OWNER, income(cash.id, 500)).await?;
        ledger.record_transaction(OWNER, expense(cash.id, 400)).await?;

        let result = ledger.delete_transaction(OWNER, salary.transaction.id).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Rolled back: the record is still there and the balance untouched.
        ledger.get_transaction(OWNER, salary.transaction.id).await?;
        assert_eq!(
            ledger.get_account(OWNER, cash.id).await?.balance,
            Money::from_major(100)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_mixed_sequence_keeps_invariant() -> Result<()> {
        let (ledger, clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;

        let mut ids = Vec::new();
        for major in [300, 125, 80] {
            ids.push(ledger.record_transaction(OWNER, income(cash.id, major)).await?.transaction.id);
        }
        for major in [45, 60, 15] {
            ids.push(ledger.record_transaction(OWNER, expense(cash.id, major)).await?.transaction.id);
            assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        }
        ledger.edit_transaction(OWNER, ids[1], amount_change(100)).await?;
        ledger.delete_transaction(OWNER, ids[3]).await?;
        clock.advance(TimeDelta::hours(1));
        ledger.edit_transaction(OWNER, ids[4], amount_change(10)).await?;
        let _ = ledger.record_transaction(OWNER, expense(cash.id, 10_000)).await;

        assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        let balance = ledger.get_account(OWNER, cash.id).await?.balance;
        assert_eq!(balance, Money::from_major(300 + 100 + 80 - 10 - 15));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expenses_exactly_one_fails() -> Result<()> {
        let (ledger, _clock) = setup_test_ledger().await?;
        let cash = create_test_account(&ledger, OWNER, "Cash").await?;
        // Covers nine of the ten expenses.
        ledger.record_transaction(OWNER, income(cash.id, 900)).await?;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let account_id = cash.id;
            tasks.push(tokio::spawn(async move {
                ledger.record_transaction(OWNER, expense(account_id, 100)).await
            }));
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::InsufficientFunds { .. }) => insufficient += 1,
                Err(other) => return Err(other),
            }
        }

        assert_eq!(succeeded, 9);
        assert_eq!(insufficient, 1);
        assert_eq!(ledger.get_account(OWNER, cash.id).await?.balance, Money::ZERO);
        assert_balance_matches_history(&ledger, OWNER, cash.id).await?;
        Ok(())
    }
}
