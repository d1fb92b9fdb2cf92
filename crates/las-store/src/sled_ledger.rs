//! On-disk ledger backed by sled.
//!
//! Each bucket is a sled tree. Write batches run as one multi-tree
//! transaction so a crash never leaves half of a batch applied.

use sled::transaction::{TransactionError, TransactionResult, Transactional};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::ledger::{Bucket, Ledger, WriteOp};

pub struct SledLedger {
    db: Db,
    contracts: Tree,
    payments: Tree,
    path: PathBuf,
}

impl SledLedger {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(&path)?;
        let contracts = db.open_tree(Bucket::Contracts.as_str())?;
        let payments = db.open_tree(Bucket::Payments.as_str())?;
        info!(
            path = %path.display(),
            contracts = contracts.len(),
            payments = payments.len(),
            "Opened ledger"
        );
        Ok(Self {
            db,
            contracts,
            payments,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&self, bucket: Bucket) -> &Tree {
        match bucket {
            Bucket::Contracts => &self.contracts,
            Bucket::Payments => &self.payments,
        }
    }
}

impl Ledger for SledLedger {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.tree(bucket).get(key)?.map(|v| v.to_vec()))
    }

    fn scan(&self, bucket: Bucket) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree(bucket)
            .iter()
            .map(|entry| {
                let (k, v) = entry?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }

    fn transaction(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let result: TransactionResult<(), ()> =
            (&self.contracts, &self.payments).transaction(|(contracts, payments)| {
                for op in ops {
                    match op {
                        WriteOp::Put { bucket, key, value } => {
                            let tree = match bucket {
                                Bucket::Contracts => contracts,
                                Bucket::Payments => payments,
                            };
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        WriteOp::Delete { bucket, key } => {
                            let tree = match bucket {
                                Bucket::Contracts => contracts,
                                Bucket::Payments => payments,
                            };
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => {
                Err(StoreError::Transaction("write batch aborted".to_string()))
            }
            Err(TransactionError::Storage(e)) => Err(StoreError::Backend(e)),
        }
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
