//! In-process store.
//!
//! All callers sharing one `MemoryStore` (usually through an `Arc`) see a
//! single linearizable table. The request timeout bounds how long a call
//! waits for the table lock.

use super::{KeyValue, KvStore, StoreError, Txn, VersionedTable};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<VersionedTable>,
    injected_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`]
    pub fn fail_next(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Revision of the last successful write
    pub fn revision(&self) -> i64 {
        self.table.lock().revision()
    }

    fn lock(&self, timeout: Duration) -> Result<MutexGuard<'_, VersionedTable>, StoreError> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        self.table
            .try_lock_for(timeout)
            .ok_or(StoreError::DeadlineExceeded(timeout))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8], timeout: Duration) -> Result<Option<KeyValue>, StoreError> {
        Ok(self.lock(timeout)?.get(key))
    }

    fn scan(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<KeyValue>, StoreError> {
        Ok(self.lock(timeout)?.scan(prefix, limit))
    }

    fn delete_prefix(&self, prefix: &[u8], timeout: Duration) -> Result<usize, StoreError> {
        Ok(self.lock(timeout)?.delete_prefix(prefix))
    }

    fn commit(&self, txn: &Txn, timeout: Duration) -> Result<bool, StoreError> {
        Ok(self.lock(timeout)?.commit(txn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(2);

        assert!(matches!(store.get(b"k", TIMEOUT), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.get(b"k", TIMEOUT), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.get(b"k", TIMEOUT), Ok(None)));
    }

    #[test]
    fn test_lock_deadline() {
        let store = MemoryStore::new();
        let _held = store.table.lock();
        assert!(matches!(
            store.get(b"k", Duration::from_millis(10)),
            Err(StoreError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn test_commit_and_read_back() {
        let store = MemoryStore::new();
        let txn = Txn::new().put(b"k".to_vec(), "v");
        assert!(store.commit(&txn, TIMEOUT).unwrap());
        assert_eq!(store.get(b"k", TIMEOUT).unwrap().unwrap().value, b"v");
        assert_eq!(store.revision(), 1);
    }
}
