//! Bucketed key-value ledger abstraction.
//!
//! Every mutation goes through `Ledger::transaction`, which applies a batch
//! of puts and deletes atomically. Reads return owned copies, so a scan is a
//! point-in-time snapshot that later writes do not disturb.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::StoreResult;

/// Durable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Contracts,
    Payments,
}

impl Bucket {
    pub const ALL: [Bucket; 2] = [Bucket::Contracts, Bucket::Payments];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Payments => "payments",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        bucket: Bucket,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: Bucket,
        key: Vec<u8>,
    },
}

impl WriteOp {
    pub fn put(bucket: Bucket, key: impl Into<Vec<u8>>, value: Vec<u8>) -> Self {
        Self::Put {
            bucket,
            key: key.into(),
            value,
        }
    }

    pub fn delete(bucket: Bucket, key: impl Into<Vec<u8>>) -> Self {
        Self::Delete {
            bucket,
            key: key.into(),
        }
    }
}

/// Storage collaborator.
pub trait Ledger: Send + Sync {
    /// Read one value.
    fn get(&self, bucket: Bucket, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Snapshot of every entry in a bucket, in key order.
    fn scan(&self, bucket: Bucket) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply all ops or none of them.
    fn transaction(&self, ops: &[WriteOp]) -> StoreResult<()>;

    /// Make previous writes durable.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process ledger for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryLedger {
    buckets: RwLock<BTreeMap<Bucket, Table>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a bucket.
    pub fn len(&self, bucket: Bucket) -> usize {
        self.buckets.read().get(&bucket).map_or(0, BTreeMap::len)
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .buckets
            .read()
            .get(&bucket)
            .and_then(|table| table.get(key).cloned()))
    }

    fn scan(&self, bucket: Bucket) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .buckets
            .read()
            .get(&bucket)
            .map(|table| {
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn transaction(&self, ops: &[WriteOp]) -> StoreResult<()> {
        // Single write lock for the whole batch
        let mut buckets = self.buckets.write();
        for op in ops {
            match op {
                WriteOp::Put { bucket, key, value } => {
                    buckets
                        .entry(*bucket)
                        .or_default()
                        .insert(key.clone(), value.clone());
                }
                WriteOp::Delete { bucket, key } => {
                    if let Some(table) = buckets.get_mut(bucket) {
                        table.remove(key);
                    }
                }
            }
        }
        Ok(())
    }
}
