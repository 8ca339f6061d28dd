//! Read-only introspection of a range: listings, usage and a full keyspace
//! dump suitable for export.

use super::keys::{RangeKeys, RegistryKeys};
use super::range::AddressRange;
use super::Allocator;
use crate::address::RangeType;
use crate::error::{AllocError, Result};
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One name/address pair as stored in a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub name: String,
    pub address: Vec<u8>,
}

/// Occupancy of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeUsage {
    pub capacity: u128,
    pub used: u128,
    pub free: u128,
}

/// Everything stored for one range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeKeyspace {
    pub prefix: String,
    pub range: AddressRange,
    pub next_address: Vec<u8>,
    pub names: Vec<AddressEntry>,
    pub hardcoded: Vec<AddressEntry>,
    pub generated: Vec<AddressEntry>,
    pub deleted: Vec<AddressEntry>,
}

/// Human readable form of [`RangeKeyspace`] with formatted addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceReport {
    pub prefix: String,
    pub range_type: RangeType,
    pub first_address: String,
    pub last_address: String,
    pub next_address: String,
    pub usage: RangeUsage,
    pub names: Vec<ReportEntry>,
    pub hardcoded: Vec<ReportEntry>,
    pub generated: Vec<ReportEntry>,
    pub deleted: Vec<ReportEntry>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub address: String,
}

impl RangeKeyspace {
    pub fn usage(&self) -> RangeUsage {
        usage_of(&self.range, self.names.len())
    }

    pub fn to_report(&self) -> KeyspaceReport {
        let entries = |list: &[AddressEntry]| -> Vec<ReportEntry> {
            list.iter()
                .map(|entry| ReportEntry {
                    name: entry.name.clone(),
                    address: self.range.format(&entry.address),
                })
                .collect()
        };

        KeyspaceReport {
            prefix: self.prefix.clone(),
            range_type: self.range.range_type,
            first_address: self.range.format(&self.range.first),
            last_address: self.range.format(&self.range.last),
            next_address: self.range.format(&self.next_address),
            usage: self.usage(),
            names: entries(&self.names),
            hardcoded: entries(&self.hardcoded),
            generated: entries(&self.generated),
            deleted: entries(&self.deleted),
            exported_at: Utc::now(),
        }
    }
}

fn usage_of(range: &AddressRange, names: usize) -> RangeUsage {
    let capacity = range.capacity();
    let used = names as u128;
    RangeUsage {
        capacity,
        used,
        free: capacity.saturating_sub(used),
    }
}

impl<S: KvStore> Allocator<S> {
    /// Names bound in the range, sorted by name
    pub fn list_names(&self, prefix: &str) -> Result<Vec<AddressEntry>> {
        let keys = RegistryKeys::new(prefix);
        Ok(self
            .scan(prefix, &keys.name, None)?
            .into_iter()
            .map(|kv| AddressEntry {
                name: String::from_utf8_lossy(&kv.key[keys.name.len()..]).into_owned(),
                address: kv.value,
            })
            .collect())
    }

    /// Hardcoded addresses, sorted by address
    pub fn list_hardcoded(&self, prefix: &str) -> Result<Vec<AddressEntry>> {
        let keys = RegistryKeys::new(prefix);
        self.list_registry(prefix, &keys.hardcoded)
    }

    /// Generated addresses, sorted by address
    pub fn list_generated(&self, prefix: &str) -> Result<Vec<AddressEntry>> {
        let keys = RegistryKeys::new(prefix);
        self.list_registry(prefix, &keys.generated)
    }

    /// The deleted pool, sorted by address
    pub fn list_deleted(&self, prefix: &str) -> Result<Vec<AddressEntry>> {
        let keys = RegistryKeys::new(prefix);
        self.list_registry(prefix, &keys.deleted)
    }

    fn list_registry(&self, prefix: &str, registry: &[u8]) -> Result<Vec<AddressEntry>> {
        Ok(self
            .scan(prefix, registry, None)?
            .into_iter()
            .map(|kv| AddressEntry {
                name: String::from_utf8_lossy(&kv.value).into_owned(),
                address: kv.key[registry.len()..].to_vec(),
            })
            .collect())
    }

    /// Capacity of the range against the number of bound names
    pub fn usage(&self, prefix: &str) -> Result<RangeUsage> {
        let range = self.require_range(prefix)?;
        let names = self.list_names(prefix)?;
        Ok(usage_of(&range, names.len()))
    }

    /// Snapshot of every key the range owns
    pub fn keyspace(&self, prefix: &str) -> Result<RangeKeyspace> {
        let range = self.require_range(prefix)?;
        let next_address = self
            .get(prefix, &RangeKeys::new(prefix).next)?
            .map(|kv| kv.value)
            .ok_or_else(|| AllocError::Corrupted {
                prefix: prefix.to_string(),
                reason: "range has no cursor".to_string(),
            })?;

        Ok(RangeKeyspace {
            prefix: prefix.to_string(),
            range,
            next_address,
            names: self.list_names(prefix)?,
            hardcoded: self.list_hardcoded(prefix)?,
            generated: self.list_generated(prefix)?,
            deleted: self.list_deleted(prefix)?,
        })
    }
}
