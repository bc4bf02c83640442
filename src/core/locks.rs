//! Per-account async locks.
//!
//! Every balance-affecting operation holds the guard for each account it
//! touches for the whole of its database transaction, so two operations on
//! the same account never interleave their read-modify-write. Guards are
//! always taken in ascending id order, which keeps two transfers running in
//! opposite directions from deadlocking.

use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Entries beyond this many trigger a sweep of idle locks.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    table: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

/// Holds the locks for a set of accounts until dropped.
#[derive(Debug)]
pub struct AccountGuard {
    account_ids: Vec<i64>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    #[must_use]
    pub fn account_ids(&self) -> &[i64] {
        &self.account_ids
    }
}

impl AccountLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every account in `account_ids`, in sorted order, skipping duplicates.
    pub async fn acquire(&self, account_ids: &[i64]) -> Result<AccountGuard> {
        let mut ids = account_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().map_err(|_| Error::LockPoisoned)?;
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            ids.iter()
                .map(|id| Arc::clone(table.entry(*id).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        trace!("Locked accounts {:?}", ids);

        Ok(AccountGuard {
            account_ids: ids,
            _guards: guards,
        })
    }

    /// Number of callers holding or waiting for the lock on `account_id`.
    #[cfg(test)]
    pub(crate) fn contenders(&self, account_id: i64) -> Result<usize> {
        let table = self.table.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(table
            .get(&account_id)
            .map_or(0, |lock| Arc::strong_count(lock) - 1))
    }
}
