//! Address range allocation engine.
//!
//! An [`Allocator`] wraps a [`KvStore`] and exposes the range lifecycle,
//! the hardcoded and generated allocators, introspection and the
//! multi-range operations. It caches nothing: every call re-reads what it
//! needs, and every mutation is a single guarded transaction, so any number
//! of allocators (in one process or many) can share one store.
//!
//! ## Layout
//!
//! - `keys`: bit-exact key layout of a range
//! - `retry`: transient retries and optimistic restarts
//! - `range`: range registry (create, read, destroy, cursor)
//! - `bimap`: name to address lookups
//! - `hardcoded`: caller chosen addresses
//! - `generated`: reclaim-first, cursor-advancing allocation
//! - `keyspace`: listings, usage and keyspace export
//! - `coordinator`: operations spanning an ordered list of ranges

use crate::error::{AllocError, Result};
use crate::store::{KeyValue, KvStore, Txn};
use std::time::Duration;

pub mod bimap;
pub mod coordinator;
pub mod generated;
pub mod hardcoded;
pub mod keys;
pub mod keyspace;
pub mod range;
pub mod retry;

pub use bimap::{AllocationKind, Binding};
pub use coordinator::{Allocation, Placement, Policy};
pub use generated::Generated;
pub use keys::{RangeKeys, RegistryKeys};
pub use keyspace::{AddressEntry, KeyspaceReport, RangeKeyspace, RangeUsage};
pub use range::AddressRange;
pub use retry::{Attempt, RetryPolicy};

/// Timeouts and retry budget applied to every store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct Allocator<S> {
    store: S,
    settings: EngineSettings,
}

impl<S: KvStore> Allocator<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Allocator { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn get(&self, prefix: &str, key: &[u8]) -> Result<Option<KeyValue>> {
        let timeout = self.settings.request_timeout;
        self.settings
            .retry
            .call("get", || self.store.get(key, timeout))
            .map_err(AllocError::store(prefix))
    }

    fn exists(&self, prefix: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(prefix, key)?.is_some())
    }

    fn scan(&self, prefix: &str, key_prefix: &[u8], limit: Option<usize>) -> Result<Vec<KeyValue>> {
        let timeout = self.settings.request_timeout;
        self.settings
            .retry
            .call("scan", || self.store.scan(key_prefix, limit, timeout))
            .map_err(AllocError::store(prefix))
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let timeout = self.settings.request_timeout;
        self.settings
            .retry
            .call("delete", || self.store.delete_prefix(prefix.as_bytes(), timeout))
            .map_err(AllocError::store(prefix))
    }

    fn commit(&self, prefix: &str, txn: &Txn) -> Result<bool> {
        let timeout = self.settings.request_timeout;
        self.settings
            .retry
            .call("commit", || self.store.commit(txn, timeout))
            .map_err(AllocError::store(prefix))
    }
}
