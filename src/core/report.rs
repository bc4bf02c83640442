//! Report generation business logic.
//!
//! Aggregates an owner's transactions and accounts into summary totals and
//! per-category and per-division breakdowns. All functions return structured
//! data; formatting for charts or display is left to the caller.

use crate::{
    core::{Ledger, account},
    entities::{Division, Transaction, TransactionKind, transaction},
    errors::Result,
    money::Money,
};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::HashMap;

/// Overall income, spending and holdings of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Sum of all income transactions
    pub income: Money,
    /// Sum of all expense transactions
    pub expense: Money,
    /// `income - expense`
    pub net: Money,
    /// Sum of the stored balances of every account
    pub total_account_balance: Money,
    pub account_count: usize,
    /// Expense as a rounded percentage of income; 0 when there is no income
    pub expense_percent: u64,
}

/// Total and count of one category under one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub kind: TransactionKind,
    pub total: Money,
    pub count: u64,
}

/// Total of one division under one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivisionTotal {
    pub division: Division,
    pub kind: TransactionKind,
    pub total: Money,
}

/// Restricts which transactions a category breakdown covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub kind: Option<TransactionKind>,
    /// Inclusive lower bound on `occurred_at`
    pub occurred_from: Option<DateTimeUtc>,
    /// Inclusive upper bound on `occurred_at`
    pub occurred_to: Option<DateTimeUtc>,
}

/// Expense as a percentage of income, rounded half up.
///
/// Returns 0 when there is no income. Spending more than was earned gives a
/// value above 100.
#[must_use]
pub fn expense_percent(income: Money, expense: Money) -> u64 {
    if !income.is_positive() || !expense.is_positive() {
        return 0;
    }
    let income = i128::from(income.minor_units());
    let expense = i128::from(expense.minor_units());
    let rounded = (expense * 200 + income) / (income * 2);
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

async fn transactions_for_report(
    ledger: &Ledger,
    owner_id: &str,
    filter: &ReportFilter,
) -> Result<Vec<transaction::Model>> {
    let mut query = Transaction::find().filter(transaction::Column::OwnerId.eq(owner_id));
    if let Some(kind) = filter.kind {
        query = query.filter(transaction::Column::Kind.eq(kind));
    }
    if let Some(from) = filter.occurred_from {
        query = query.filter(transaction::Column::OccurredAt.gte(from));
    }
    if let Some(to) = filter.occurred_to {
        query = query.filter(transaction::Column::OccurredAt.lte(to));
    }
    query
        .order_by_asc(transaction::Column::Id)
        .all(ledger.db())
        .await
        .map_err(Into::into)
}

impl Ledger {
    /// Income and expense totals alongside the owner's account holdings.
    pub async fn summary(&self, owner_id: &str) -> Result<Summary> {
        let transactions = transactions_for_report(self, owner_id, &ReportFilter::default()).await?;

        let mut income = Money::ZERO;
        let mut expense = Money::ZERO;
        for transaction in &transactions {
            match transaction.kind {
                TransactionKind::Income => income = income.try_add(transaction.amount)?,
                TransactionKind::Expense => expense = expense.try_add(transaction.amount)?,
            }
        }

        let accounts = account::accounts_for_owner(self.db(), owner_id).await?;
        let mut total_account_balance = Money::ZERO;
        for account in &accounts {
            total_account_balance = total_account_balance.try_add(account.balance)?;
        }

        Ok(Summary {
            income,
            expense,
            net: income.try_sub(expense)?,
            total_account_balance,
            account_count: accounts.len(),
            expense_percent: expense_percent(income, expense),
        })
    }

    /// Totals per `(category, kind)`, largest first.
    pub async fn category_totals(
        &self,
        owner_id: &str,
        filter: &ReportFilter,
    ) -> Result<Vec<CategoryTotal>> {
        let transactions = transactions_for_report(self, owner_id, filter).await?;

        let mut groups: HashMap<(String, TransactionKind), (Money, u64)> = HashMap::new();
        for transaction in transactions {
            let entry = groups
                .entry((transaction.category, transaction.kind))
                .or_insert((Money::ZERO, 0));
            entry.0 = entry.0.try_add(transaction.amount)?;
            entry.1 += 1;
        }

        let mut totals: Vec<CategoryTotal> = groups
            .into_iter()
            .map(|((category, kind), (total, count))| CategoryTotal {
                category,
                kind,
                total,
                count,
            })
            .collect();
        totals.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        Ok(totals)
    }

    /// Totals per `(division, kind)`, ordered by division then kind.
    pub async fn division_totals(&self, owner_id: &str) -> Result<Vec<DivisionTotal>> {
        let transactions = transactions_for_report(self, owner_id, &ReportFilter::default()).await?;

        let mut groups: HashMap<(Division, TransactionKind), Money> = HashMap::new();
        for transaction in transactions {
            let total = groups
                .entry((transaction.division, transaction.kind))
                .or_insert(Money::ZERO);
            *total = total.try_add(transaction.amount)?;
        }

        let mut totals: Vec<DivisionTotal> = groups
            .into_iter()
            .map(|((division, kind), total)| DivisionTotal {
                division,
                kind,
                total,
            })
            .collect();
        totals.sort_by_key(|total| (total.division, total.kind));
        Ok(totals)
    }
}
