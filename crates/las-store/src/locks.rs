//! Per-contract mutation locks.
//!
//! The settlement correlator, the rebalance engine and request handlers all
//! read-modify-write contract records. Each of them takes the contract's lock
//! for the whole sequence so one cannot overwrite the other's update.

use dashmap::DashMap;
use las_core::ContractId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default, Clone)]
pub struct ContractLocks {
    locks: Arc<DashMap<ContractId, Arc<Mutex<()>>>>,
}

impl ContractLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &ContractId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the lock entry of a deleted contract.
    pub fn remove(&self, id: &ContractId) {
        self.locks.remove(id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
