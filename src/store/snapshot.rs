//! File backed store.
//!
//! The whole versioned table is kept in one state file as a zstd compressed
//! bincode snapshot. Each call takes an exclusive lock file next to the
//! state file, loads the snapshot, applies the request and, for writes,
//! atomically replaces the state file before releasing the lock. Several
//! processes can therefore share one state file and still get the guarded
//! transaction semantics the allocator relies on.
//!
//! A lock that cannot be obtained before the request deadline is reported
//! as [`StoreError::Unavailable`] so that callers retry it.

use super::{KeyValue, KvStore, StoreError, Txn, VersionedTable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Bumped whenever the snapshot layout changes
const SNAPSHOT_FORMAT: u32 = 1;

/// zstd compression level for snapshots
const COMPRESSION_LEVEL: i32 = 3;

/// Delay between attempts to take the lock file
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format: u32,
    table: VersionedTable,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held while a request runs; removes the lock file when dropped
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release lock file {:?}: {}", self.path, e);
        }
    }
}

impl FileStore {
    /// Use `path` as state file. The file itself is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Ok(FileStore { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire(&self, timeout: Duration) -> Result<LockFile, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Ok(LockFile {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Unavailable(format!(
                            "state file {} is locked (remove {} if no other process is running)",
                            self.path.display(),
                            self.lock_path.display()
                        )));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn load(&self) -> Result<VersionedTable, StoreError> {
        let compressed = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VersionedTable::new()),
            Err(e) => return Err(e.into()),
        };

        let raw = zstd::decode_all(&compressed[..])
            .map_err(|e| StoreError::Snapshot(format!("decompression failed: {}", e)))?;
        let snapshot: Snapshot = bincode::deserialize(&raw)
            .map_err(|e| StoreError::Snapshot(format!("decoding failed: {}", e)))?;

        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(StoreError::Snapshot(format!(
                "unsupported snapshot format {} (expected {})",
                snapshot.format, SNAPSHOT_FORMAT
            )));
        }

        Ok(snapshot.table)
    }

    fn persist(&self, table: VersionedTable) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            format: SNAPSHOT_FORMAT,
            table,
        };
        let raw = bincode::serialize(&snapshot)
            .map_err(|e| StoreError::Snapshot(format!("encoding failed: {}", e)))?;
        let compressed = zstd::encode_all(&raw[..], COMPRESSION_LEVEL)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(
            "Persisted snapshot at revision {} to {:?}",
            snapshot.table.revision(),
            self.path
        );
        Ok(())
    }

    /// Run `f` against the current table under the lock file
    fn read<T>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&VersionedTable) -> T,
    ) -> Result<T, StoreError> {
        let _lock = self.acquire(timeout)?;
        let table = self.load()?;
        Ok(f(&table))
    }

    /// Like `read`, but persists the table when `f` reports a change
    fn write<T>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&mut VersionedTable) -> (T, bool),
    ) -> Result<T, StoreError> {
        let _lock = self.acquire(timeout)?;
        let mut table = self.load()?;
        let (result, changed) = f(&mut table);
        if changed {
            self.persist(table)?;
        }
        Ok(result)
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &[u8], timeout: Duration) -> Result<Option<KeyValue>, StoreError> {
        self.read(timeout, |table| table.get(key))
    }

    fn scan(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<KeyValue>, StoreError> {
        self.read(timeout, |table| table.scan(prefix, limit))
    }

    fn delete_prefix(&self, prefix: &[u8], timeout: Duration) -> Result<usize, StoreError> {
        self.write(timeout, |table| {
            let removed = table.delete_prefix(prefix);
            (removed, removed > 0)
        })
    }

    fn commit(&self, txn: &Txn, timeout: Duration) -> Result<bool, StoreError> {
        self.write(timeout, |table| {
            let succeeded = table.commit(txn);
            (succeeded, succeeded && !txn.ops.is_empty())
        })
    }
}
