//! Backing store contract.
//!
//! The allocator keeps no state of its own. Everything lives in a
//! key-value store that offers:
//!
//! - linearizable single key reads and key-sorted prefix scans
//! - a per-key `version` counter (1 on creation, +1 per put, 0 when absent)
//! - atomic multi-key transactions that apply only when every guard holds
//!
//! Two backends are provided: [`MemoryStore`] for in-process use and tests,
//! and [`FileStore`] which shares one state file between processes.
//!
//! Every call carries an explicit timeout. Only [`StoreError::Unavailable`]
//! is considered transient; callers retry it and nothing else.

use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod snapshot;
pub mod table;

pub use memory::MemoryStore;
pub use snapshot::FileStore;
pub use table::VersionedTable;

/// A key as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Number of puts since the key was (re)created
    pub version: i64,
    /// Store revision of the last modification
    pub mod_revision: i64,
}

/// Predicate checked atomically at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Absent(Vec<u8>),
    Present(Vec<u8>),
    VersionEquals(Vec<u8>, i64),
    ValueEquals(Vec<u8>, Vec<u8>),
}

/// Write applied when all guards of a transaction hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Guarded multi-key transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txn {
    pub guards: Vec<Guard>,
    pub ops: Vec<Op>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn when_all(mut self, guards: impl IntoIterator<Item = Guard>) -> Self {
        self.guards.extend(guards);
        self
    }

    pub fn put(mut self, key: Vec<u8>, value: impl Into<Vec<u8>>) -> Self {
        self.ops.push(Op::Put(key, value.into()));
        self
    }

    pub fn delete(mut self, key: Vec<u8>) -> Self {
        self.ops.push(Op::Delete(key));
        self
    }
}

/// Errors reported by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store request did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable store snapshot: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Whether the request may succeed if simply attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Operations the allocator needs from its backing store
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8], timeout: Duration) -> Result<Option<KeyValue>, StoreError>;

    /// Keys starting with `prefix` in ascending byte order, at most `limit`
    fn scan(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<KeyValue>, StoreError>;

    /// Remove every key starting with `prefix`, returning how many were removed
    fn delete_prefix(&self, prefix: &[u8], timeout: Duration) -> Result<usize, StoreError>;

    /// Apply `txn` if all of its guards hold. `Ok(false)` means nothing was written.
    fn commit(&self, txn: &Txn, timeout: Duration) -> Result<bool, StoreError>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8], timeout: Duration) -> Result<Option<KeyValue>, StoreError> {
        (**self).get(key, timeout)
    }

    fn scan(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<KeyValue>, StoreError> {
        (**self).scan(prefix, limit, timeout)
    }

    fn delete_prefix(&self, prefix: &[u8], timeout: Duration) -> Result<usize, StoreError> {
        (**self).delete_prefix(prefix, timeout)
    }

    fn commit(&self, txn: &Txn, timeout: Duration) -> Result<bool, StoreError> {
        (**self).commit(txn, timeout)
    }
}
