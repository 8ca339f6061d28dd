//! Name to address lookups.
//!
//! Inside a range, `data/name/<name>` and the address registries form a
//! one-to-one mapping: a name entry exists exactly when its address sits in
//! the hardcoded or the generated registry, and both sides agree.

use super::keys::RegistryKeys;
use super::Allocator;
use crate::error::{AllocError, Result};
use crate::store::{Guard, KvStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an address came to be bound to its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationKind {
    Hardcoded,
    Generated,
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationKind::Hardcoded => f.write_str("hardcoded"),
            AllocationKind::Generated => f.write_str("generated"),
        }
    }
}

/// Current binding of a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub address: Vec<u8>,
    pub kind: AllocationKind,
}

impl<S: KvStore> Allocator<S> {
    /// Address bound to `name`, if any
    pub fn find_name(&self, prefix: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let keys = RegistryKeys::new(prefix);
        Ok(self.get(prefix, &keys.name_key(name))?.map(|kv| kv.value))
    }

    /// Address bound to `name`; absence is an error
    pub fn get_address(&self, prefix: &str, name: &str) -> Result<Vec<u8>> {
        self.find_name(prefix, name)?
            .ok_or_else(|| AllocError::NameNotFound {
                prefix: prefix.to_string(),
                name: name.to_string(),
            })
    }

    /// Address bound to `name` together with how it was allocated
    pub fn get_address_details(&self, prefix: &str, name: &str) -> Result<Option<Binding>> {
        let Some(address) = self.find_name(prefix, name)? else {
            return Ok(None);
        };

        let kind = if self.is_hardcoded(prefix, &address)? {
            AllocationKind::Hardcoded
        } else {
            AllocationKind::Generated
        };
        Ok(Some(Binding { address, kind }))
    }

    pub(crate) fn is_hardcoded(&self, prefix: &str, address: &[u8]) -> Result<bool> {
        self.exists(prefix, &RegistryKeys::new(prefix).hardcoded_key(address))
    }

    pub(crate) fn is_generated(&self, prefix: &str, address: &[u8]) -> Result<bool> {
        self.exists(prefix, &RegistryKeys::new(prefix).generated_key(address))
    }

    pub(crate) fn is_deleted(&self, prefix: &str, address: &[u8]) -> Result<bool> {
        self.exists(prefix, &RegistryKeys::new(prefix).deleted_key(address))
    }

    /// Lowest address in the deleted pool.
    ///
    /// Keys end with the raw address bytes, so the first key of the prefix
    /// scan is the numerically lowest reclaimable address.
    pub(crate) fn first_deleted(&self, prefix: &str) -> Result<Option<Vec<u8>>> {
        let keys = RegistryKeys::new(prefix);
        let first = self.scan(prefix, &keys.deleted, Some(1))?;
        Ok(first
            .into_iter()
            .next()
            .map(|kv| kv.key[keys.deleted.len()..].to_vec()))
    }
}

/// Guards asserting that `name` is free in every listed range
pub(crate) fn name_absent_guards<'a, I>(
    name: &'a str,
    prefixes: I,
) -> impl Iterator<Item = Guard> + 'a
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: 'a,
{
    prefixes
        .into_iter()
        .map(move |prefix| Guard::Absent(RegistryKeys::new(prefix).name_key(name)))
}
