use crate::domain::account::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-account exclusive locks.
///
/// A guard is held across a whole read-validate-write sequence on one
/// account. Different accounts never contend; the registry's own mutex is only
/// held while looking up, inserting or pruning a lock handle, never across an
/// await. An entry is dropped once no guard or waiter refers to it.
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one account until dropped.
pub struct AccountGuard<'a> {
    registry: &'a AccountLocks,
    id: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<AccountId, Arc<AsyncMutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn acquire(&self, id: AccountId) -> AccountGuard<'_> {
        let lock = self.registry().entry(id).or_default().clone();
        AccountGuard {
            registry: self,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release(&self, id: AccountId) {
        let mut locks = self.registry();
        if locks
            .get(&id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&id);
        }
    }

    /// Number of accounts with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.registry().len()
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release(self.id);
    }
}
