//! Errors reported by allocator operations.
//!
//! Every variant names the range prefix it concerns, plus the name and/or
//! the formatted address when one is involved.

use crate::address::{AddressError, RangeType};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The store could not serve a request, after transient retries ran out
    #[error("store request for range '{prefix}' failed: {source}")]
    Store {
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("range '{prefix}' does not exist")]
    RangeNotFound { prefix: String },

    #[error("an address range already exists at prefix '{prefix}'")]
    RangeExists { prefix: String },

    #[error("invalid range '{prefix}': {reason}")]
    InvalidRange { prefix: String, reason: String },

    #[error("invalid address for range '{prefix}': {source}")]
    InvalidAddress {
        prefix: String,
        #[source]
        source: AddressError,
    },

    #[error("range '{prefix}' holds {actual} addresses, expected {expected}")]
    TypeMismatch {
        prefix: String,
        expected: RangeType,
        actual: RangeType,
    },

    #[error("address '{address}' is outside the boundaries of range '{prefix}'")]
    OutOfBounds { prefix: String, address: String },

    #[error("cannot assign address {} to '{name}' in range '{prefix}': address or name already in use", .address.as_deref().unwrap_or("(next free)"))]
    AlreadyAssigned {
        prefix: String,
        name: String,
        address: Option<String>,
    },

    #[error("address '{address}' is not assigned to '{name}' in range '{prefix}'")]
    NotAssigned {
        prefix: String,
        name: String,
        address: String,
    },

    #[error("no address named '{name}' in range '{prefix}'")]
    NameNotFound { prefix: String, name: String },

    /// Tolerated pre-existing state did not match what the caller asked for
    #[error("existing address '{name}' in range '{prefix}' does not match: {reason}")]
    BindingMismatch {
        prefix: String,
        name: String,
        reason: String,
    },

    #[error("range '{prefix}' ran out of addresses")]
    RangeFull { prefix: String },

    #[error("cannot assign '{name}': ranges {} are all full", .prefixes.join(", "))]
    RangesExhausted { name: String, prefixes: Vec<String> },

    #[error("cannot handle '{name}': no ranges given")]
    NoRanges { name: String },

    /// Optimistic transactions kept losing to concurrent writers
    #[error("gave up on '{name}' in range '{prefix}' after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        prefix: String,
        name: String,
        attempts: u32,
    },

    #[error("range '{prefix}' is corrupted: {reason}")]
    Corrupted { prefix: String, reason: String },
}

impl AllocError {
    /// Store failure scoped to `prefix`
    pub fn store(prefix: &str) -> impl FnOnce(StoreError) -> AllocError + '_ {
        move |source| AllocError::Store {
            prefix: prefix.to_string(),
            source,
        }
    }

    pub fn invalid_address(prefix: &str) -> impl FnOnce(AddressError) -> AllocError + '_ {
        move |source| AllocError::InvalidAddress {
            prefix: prefix.to_string(),
            source,
        }
    }

    /// Whether the error stems from the store being unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AllocError::Store { .. })
    }

    /// Whether the error reports something absent (range or name)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AllocError::RangeNotFound { .. } | AllocError::NameNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AllocError>;
