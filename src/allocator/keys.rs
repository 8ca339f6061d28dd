//! Key layout of a range in the store.
//!
//! ```text
//! P + "info/type"                            -> range type string
//! P + "info/firstaddr"                       -> first address (raw bytes)
//! P + "info/lastaddr"                        -> last address (raw bytes)
//! P + "data/nextaddr"                        -> cursor (raw bytes)
//! P + "data/name/" + name                    -> address (raw bytes)
//! P + "data/address/hardcoded/" + addrBytes  -> name
//! P + "data/address/generated/" + addrBytes  -> name
//! P + "data/address/deleted/" + addrBytes    -> name
//! ```
//!
//! Addresses are appended to keys as raw bytes, so a prefix scan of one of
//! the address registries returns its entries in numeric address order.

/// Keys of the range metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeKeys {
    pub info: Vec<u8>,
    pub range_type: Vec<u8>,
    pub first: Vec<u8>,
    pub last: Vec<u8>,
    pub next: Vec<u8>,
}

impl RangeKeys {
    pub fn new(prefix: &str) -> Self {
        RangeKeys {
            info: format!("{}info/", prefix).into_bytes(),
            range_type: format!("{}info/type", prefix).into_bytes(),
            first: format!("{}info/firstaddr", prefix).into_bytes(),
            last: format!("{}info/lastaddr", prefix).into_bytes(),
            next: format!("{}data/nextaddr", prefix).into_bytes(),
        }
    }
}

/// Prefixes of the name and address registries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryKeys {
    pub name: Vec<u8>,
    pub hardcoded: Vec<u8>,
    pub generated: Vec<u8>,
    pub deleted: Vec<u8>,
}

impl RegistryKeys {
    pub fn new(prefix: &str) -> Self {
        RegistryKeys {
            name: format!("{}data/name/", prefix).into_bytes(),
            hardcoded: format!("{}data/address/hardcoded/", prefix).into_bytes(),
            generated: format!("{}data/address/generated/", prefix).into_bytes(),
            deleted: format!("{}data/address/deleted/", prefix).into_bytes(),
        }
    }

    pub fn name_key(&self, name: &str) -> Vec<u8> {
        join(&self.name, name.as_bytes())
    }

    pub fn hardcoded_key(&self, address: &[u8]) -> Vec<u8> {
        join(&self.hardcoded, address)
    }

    pub fn generated_key(&self, address: &[u8]) -> Vec<u8> {
        join(&self.generated, address)
    }

    pub fn deleted_key(&self, address: &[u8]) -> Vec<u8> {
        join(&self.deleted, address)
    }
}

fn join(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}
