//! Generated allocator: hand out the next free address automatically.
//!
//! Reclaimed addresses (the deleted pool) are always reused first, lowest
//! address first. Only when the pool is empty does the cursor advance,
//! skipping hardcoded addresses. The cursor never moves backwards.
//!
//! When the cursor reaches the maximum representable address it stays
//! there instead of wrapping to zero; that address is then issued at most
//! once and the range reports itself full afterwards.

use super::bimap::name_absent_guards;
use super::keys::{RangeKeys, RegistryKeys};
use super::retry::Attempt;
use super::Allocator;
use crate::error::{AllocError, Result};
use crate::store::{Guard, KvStore, Txn};
use log::{debug, info};
use std::cmp::Ordering;

/// Outcome of a generation attempt against one range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Assigned(Vec<u8>),
    /// No free address left; not an error, the caller may try another range
    RangeFull,
}

impl<S: KvStore> Allocator<S> {
    /// Issue an address for `name` in the range at `prefix`.
    ///
    /// `exclusive` lists ranges in which `name` must not exist either; the
    /// range itself is always included.
    pub fn create_generated<P: AsRef<str>>(
        &self,
        prefix: &str,
        name: &str,
        exclusive: &[P],
    ) -> Result<Generated> {
        let mut scope: Vec<&str> = exclusive.iter().map(|p| p.as_ref()).collect();
        if !scope.contains(&prefix) {
            scope.push(prefix);
        }

        let outcome = self
            .settings
            .retry
            .optimistic("create generated", |_| -> Result<Attempt<Generated>> {
                let attempt = match self.first_deleted(prefix)? {
                    Some(address) => self.generate_from_pool(prefix, name, &scope, address)?,
                    None => self.generate_from_cursor(prefix, name, &scope)?,
                };

                if attempt == Attempt::Conflict && self.name_taken(name, &scope)? {
                    return Err(AllocError::AlreadyAssigned {
                        prefix: prefix.to_string(),
                        name: name.to_string(),
                        address: None,
                    });
                }
                Ok(attempt)
            })?;

        match outcome {
            Some(Generated::Assigned(address)) => {
                info!(
                    "Generated address {} for '{}' in range '{}'",
                    self.format_in(prefix, &address),
                    name,
                    prefix
                );
                Ok(Generated::Assigned(address))
            }
            Some(Generated::RangeFull) => {
                debug!("Range '{}' is full", prefix);
                Ok(Generated::RangeFull)
            }
            None => Err(AllocError::ConflictRetriesExhausted {
                prefix: prefix.to_string(),
                name: name.to_string(),
                attempts: self.settings.retry.attempts(),
            }),
        }
    }

    /// Single range entry point: a full range is an error here
    pub fn create_generated_address(&self, prefix: &str, name: &str) -> Result<Vec<u8>> {
        match self.create_generated(prefix, name, &[prefix])? {
            Generated::Assigned(address) => Ok(address),
            Generated::RangeFull => Err(AllocError::RangeFull {
                prefix: prefix.to_string(),
            }),
        }
    }

    /// Release a generated address into the deleted pool
    pub fn delete_generated(&self, prefix: &str, name: &str, address: &[u8]) -> Result<()> {
        let keys = RegistryKeys::new(prefix);
        let generated_key = keys.generated_key(address);
        let deleted_key = keys.deleted_key(address);
        let name_key = keys.name_key(name);

        let txn = Txn::new()
            .when(Guard::ValueEquals(generated_key.clone(), name.as_bytes().to_vec()))
            .when(Guard::ValueEquals(name_key.clone(), address.to_vec()))
            .when(Guard::Absent(deleted_key.clone()))
            .delete(generated_key)
            .delete(name_key)
            .put(deleted_key, name);

        if !self.commit(prefix, &txn)? {
            return Err(AllocError::NotAssigned {
                prefix: prefix.to_string(),
                name: name.to_string(),
                address: self.format_in(prefix, address),
            });
        }

        info!(
            "Released generated address {} of '{}' in range '{}'",
            self.format_in(prefix, address),
            name,
            prefix
        );
        Ok(())
    }

    fn generate_from_pool(
        &self,
        prefix: &str,
        name: &str,
        scope: &[&str],
        address: Vec<u8>,
    ) -> Result<Attempt<Generated>> {
        let keys = RegistryKeys::new(prefix);
        let deleted_key = keys.deleted_key(&address);

        let txn = Txn::new()
            .when(Guard::Present(deleted_key.clone()))
            .when_all(name_absent_guards(name, scope.iter().copied()))
            .delete(deleted_key)
            .put(keys.generated_key(&address), name)
            .put(keys.name_key(name), address.clone());

        if self.commit(prefix, &txn)? {
            Ok(Attempt::Done(Generated::Assigned(address)))
        } else {
            Ok(Attempt::Conflict)
        }
    }

    fn generate_from_cursor(
        &self,
        prefix: &str,
        name: &str,
        scope: &[&str],
    ) -> Result<Attempt<Generated>> {
        let range = self.require_range(prefix)?;
        let codec = range.codec();
        let (mut cursor, version) = self.read_cursor(prefix)?;

        if codec.check_width(&cursor).is_err() {
            return Err(AllocError::Corrupted {
                prefix: prefix.to_string(),
                reason: format!("cursor has {} bytes, expected {}", cursor.len(), codec.width()),
            });
        }
        if codec.compare(&cursor, &range.first) == Ordering::Less {
            cursor = range.first.clone();
        }

        // Skipped addresses must still be hardcoded when the cursor passes them
        let mut skipped = Vec::new();
        loop {
            if codec.compare(&cursor, &range.last) == Ordering::Greater {
                return Ok(Attempt::Done(Generated::RangeFull));
            }
            if !self.is_hardcoded(prefix, &cursor)? {
                break;
            }
            match codec.increment(&cursor) {
                Some(next) => skipped.push(std::mem::replace(&mut cursor, next)),
                None => return Ok(Attempt::Done(Generated::RangeFull)),
            }
        }

        let advanced = match codec.increment(&cursor) {
            Some(next) => next,
            None => {
                // Saturated cursor: the maximum address may already be out
                if self.is_generated(prefix, &cursor)? {
                    return Ok(Attempt::Done(Generated::RangeFull));
                }
                cursor.clone()
            }
        };

        let range_keys = RangeKeys::new(prefix);
        let keys = RegistryKeys::new(prefix);
        let txn = Txn::new()
            .when(Guard::VersionEquals(range_keys.next.clone(), version))
            .when(Guard::Absent(keys.hardcoded_key(&cursor)))
            .when(Guard::Absent(keys.generated_key(&cursor)))
            .when_all(skipped.iter().map(|address| Guard::Present(keys.hardcoded_key(address))))
            .when_all(name_absent_guards(name, scope.iter().copied()))
            .put(keys.generated_key(&cursor), name)
            .put(range_keys.next, advanced)
            .put(keys.name_key(name), cursor.clone());

        if self.commit(prefix, &txn)? {
            Ok(Attempt::Done(Generated::Assigned(cursor)))
        } else {
            Ok(Attempt::Conflict)
        }
    }

    fn name_taken(&self, name: &str, scope: &[&str]) -> Result<bool> {
        for prefix in scope {
            if self.find_name(prefix, name)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Format `address` with the codec of the range at `prefix`, hex if unknown
    pub(crate) fn format_in(&self, prefix: &str, address: &[u8]) -> String {
        match self.get_range(prefix) {
            Ok(Some(range)) => range.format(address),
            Ok(None) => crate::address::to_hex(address),
            Err(e) => {
                debug!("Could not read range '{}' to format an address: {}", prefix, e);
                crate::address::to_hex(address)
            }
        }
    }
}
