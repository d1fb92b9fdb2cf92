//! Contract registry.
//!
//! Owns the durable representation of contracts. Callers hold transient
//! copies and write back through `put` to make a change visible.
//! The registry does not lock records across calls; pair it with
//! `ContractLocks` for read-modify-write sequences.

use las_core::{Contract, ContractId};
use std::sync::Arc;
use std::vec::IntoIter;
use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::ledger::{Bucket, Ledger, WriteOp};

#[derive(Clone)]
pub struct ContractRegistry {
    ledger: Arc<dyn Ledger>,
}

impl ContractRegistry {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Store a new contract. Fails if the id is already taken.
    pub fn create(&self, contract: &Contract) -> StoreResult<()> {
        if self
            .ledger
            .get(Bucket::Contracts, contract.id.as_bytes())?
            .is_some()
        {
            return Err(StoreError::AlreadyExists(contract.id.to_string()));
        }
        self.put(contract)
    }

    /// Load a contract.
    pub fn get(&self, id: &ContractId) -> StoreResult<Contract> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Load a contract if present.
    pub fn find(&self, id: &ContractId) -> StoreResult<Option<Contract>> {
        match self.ledger.get(Bucket::Contracts, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored record with `contract`.
    pub fn put(&self, contract: &Contract) -> StoreResult<()> {
        let bytes = serde_json::to_vec(contract)?;
        self.ledger.transaction(&[WriteOp::put(
            Bucket::Contracts,
            contract.id.as_bytes(),
            bytes,
        )])?;
        trace!(contract_id = %contract.id, update_count = contract.update_count, "Contract saved");
        Ok(())
    }

    /// Remove a contract. Removing a missing id is not an error.
    pub fn delete(&self, id: &ContractId) -> StoreResult<()> {
        self.ledger
            .transaction(&[WriteOp::delete(Bucket::Contracts, id.as_bytes())])?;
        trace!(contract_id = %id, "Contract deleted");
        Ok(())
    }

    /// Point-in-time snapshot of all contracts.
    ///
    /// Records are decoded lazily while iterating. Call again to restart.
    pub fn enumerate(&self) -> StoreResult<ContractScan> {
        Ok(ContractScan {
            entries: self.ledger.scan(Bucket::Contracts)?.into_iter(),
        })
    }

    /// Number of stored contracts.
    pub fn count(&self) -> StoreResult<usize> {
        Ok(self.ledger.scan(Bucket::Contracts)?.len())
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.ledger.flush()
    }
}

/// Finite iterator over a contract snapshot.
///
/// Records that fail to decode are logged and skipped.
pub struct ContractScan {
    entries: IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl Iterator for ContractScan {
    type Item = Contract;

    fn next(&mut self) -> Option<Self::Item> {
        for (key, value) in self.entries.by_ref() {
            match serde_json::from_slice::<Contract>(&value) {
                Ok(contract) => return Some(contract),
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping undecodable contract record"
                    );
                }
            }
        }
        None
    }
}
