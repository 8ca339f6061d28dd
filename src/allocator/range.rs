//! Range registry.
//!
//! A range is four keys created in one transaction: its type, its first and
//! last address, and the issuance cursor (initialised to the first
//! address). The range is the unit of mutual exclusion for everything in
//! its `data/` subtree.

use super::keys::RangeKeys;
use super::Allocator;
use crate::address::{self, AddressCodec, AddressError, RangeType};
use crate::error::{AllocError, Result};
use crate::store::{Guard, KvStore, Txn};
use log::info;
use std::cmp::Ordering;

/// Typed, bounded interval of addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    pub range_type: RangeType,
    pub first: Vec<u8>,
    pub last: Vec<u8>,
}

impl AddressRange {
    pub fn new(range_type: RangeType, first: Vec<u8>, last: Vec<u8>) -> Self {
        AddressRange {
            range_type,
            first,
            last,
        }
    }

    /// Build a range from textual boundaries
    pub fn parse(
        range_type: RangeType,
        first: &str,
        last: &str,
    ) -> std::result::Result<Self, AddressError> {
        let codec = range_type.codec();
        Ok(AddressRange::new(range_type, codec.parse(first)?, codec.parse(last)?))
    }

    pub fn codec(&self) -> &'static dyn AddressCodec {
        self.range_type.codec()
    }

    /// Whether `address` has this range's width and lies within its boundaries
    pub fn contains(&self, address: &[u8]) -> bool {
        address.len() == self.codec().width() && address::within(address, &self.first, &self.last)
    }

    pub fn capacity(&self) -> u128 {
        self.codec().capacity(&self.first, &self.last)
    }

    pub fn format(&self, address: &[u8]) -> String {
        self.codec().format(address)
    }

    fn validate(&self, prefix: &str) -> Result<()> {
        let codec = self.codec();
        codec
            .check_width(&self.first)
            .and_then(|_| codec.check_width(&self.last))
            .map_err(AllocError::invalid_address(prefix))?;

        if codec.compare(&self.first, &self.last) == Ordering::Greater {
            return Err(AllocError::InvalidRange {
                prefix: prefix.to_string(),
                reason: format!(
                    "first address {} is greater than last address {}",
                    self.format(&self.first),
                    self.format(&self.last)
                ),
            });
        }
        Ok(())
    }
}

pub(crate) fn check_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(AllocError::InvalidRange {
            prefix: prefix.to_string(),
            reason: "range prefix cannot be empty".to_string(),
        });
    }
    Ok(())
}

impl<S: KvStore> Allocator<S> {
    /// Create a range at `prefix`. Fails if any of its keys already exists.
    pub fn create_range(&self, prefix: &str, range: &AddressRange) -> Result<()> {
        check_prefix(prefix)?;
        range.validate(prefix)?;

        let keys = RangeKeys::new(prefix);
        let txn = Txn::new()
            .when(Guard::VersionEquals(keys.range_type.clone(), 0))
            .when(Guard::VersionEquals(keys.first.clone(), 0))
            .when(Guard::VersionEquals(keys.last.clone(), 0))
            .when(Guard::VersionEquals(keys.next.clone(), 0))
            .put(keys.range_type, range.range_type.as_str())
            .put(keys.first, range.first.clone())
            .put(keys.last, range.last.clone())
            .put(keys.next, range.first.clone());

        if !self.commit(prefix, &txn)? {
            return Err(AllocError::RangeExists {
                prefix: prefix.to_string(),
            });
        }

        info!(
            "Created {} range {} - {} at '{}'",
            range.range_type,
            range.format(&range.first),
            range.format(&range.last),
            prefix
        );
        Ok(())
    }

    /// Read the range at `prefix`.
    ///
    /// A partially present range (not exactly three info keys) reads as
    /// absent rather than as an error.
    pub fn get_range(&self, prefix: &str) -> Result<Option<AddressRange>> {
        let keys = RangeKeys::new(prefix);
        let info = self.scan(prefix, &keys.info, None)?;
        if info.len() != 3 {
            return Ok(None);
        }

        let mut range_type = None;
        let mut first = None;
        let mut last = None;
        for kv in info {
            if kv.key == keys.range_type {
                range_type = Some(kv.value);
            } else if kv.key == keys.first {
                first = Some(kv.value);
            } else if kv.key == keys.last {
                last = Some(kv.value);
            }
        }

        let (Some(range_type), Some(first), Some(last)) = (range_type, first, last) else {
            return Ok(None);
        };

        let corrupted = |reason: String| AllocError::Corrupted {
            prefix: prefix.to_string(),
            reason,
        };
        let range_type = String::from_utf8(range_type)
            .map_err(|_| corrupted("range type is not valid UTF-8".to_string()))?
            .parse::<RangeType>()
            .map_err(|e| corrupted(e.to_string()))?;

        let codec = range_type.codec();
        codec
            .check_width(&first)
            .and_then(|_| codec.check_width(&last))
            .map_err(|e| corrupted(e.to_string()))?;

        Ok(Some(AddressRange::new(range_type, first, last)))
    }

    /// Like [`get_range`](Self::get_range), but absence is an error
    pub fn require_range(&self, prefix: &str) -> Result<AddressRange> {
        self.get_range(prefix)?.ok_or_else(|| AllocError::RangeNotFound {
            prefix: prefix.to_string(),
        })
    }

    /// Delete the range and everything allocated in it. Irreversible.
    pub fn destroy_range(&self, prefix: &str) -> Result<()> {
        check_prefix(prefix)?;
        let removed = self.delete_prefix(prefix)?;
        info!("Destroyed range at '{}' ({} keys removed)", prefix, removed);
        Ok(())
    }

    /// Current cursor of the range and the version of its key
    pub(crate) fn read_cursor(&self, prefix: &str) -> Result<(Vec<u8>, i64)> {
        let keys = RangeKeys::new(prefix);
        match self.get(prefix, &keys.next)? {
            Some(kv) => Ok((kv.value, kv.version)),
            None => Err(AllocError::RangeNotFound {
                prefix: prefix.to_string(),
            }),
        }
    }
}
