//! Operations over an ordered list of ranges.
//!
//! These are the entry points a provisioning layer calls. They validate the
//! range type, resolve which range a name or address belongs to, and apply
//! the [`Policy`] to state that already exists (or is already gone).

use super::bimap::{AllocationKind, Binding};
use super::generated::Generated;
use super::range::AddressRange;
use super::Allocator;
use crate::address::RangeType;
use crate::error::{AllocError, Result};
use crate::store::KvStore;
use log::warn;
use serde::{Deserialize, Serialize};

/// How pre-existing or missing state is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Anything unexpected is an error
    #[default]
    Strict,
    /// Matching pre-existing state is accepted, missing state is a no-op
    Tolerant,
}

impl Policy {
    pub fn is_tolerant(self) -> bool {
        self == Policy::Tolerant
    }
}

/// Where a name is currently bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub prefix: String,
    pub address: Vec<u8>,
    pub kind: AllocationKind,
}

/// Result of a validated create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub prefix: String,
    pub address: Vec<u8>,
    /// The binding existed before the call and was accepted as is
    pub pre_existing: bool,
}

impl<S: KvStore> Allocator<S> {
    /// First range in `prefixes` whose boundaries contain `address`.
    ///
    /// Every range up to the match must exist and have the address' width.
    pub fn find_range_by_address<P: AsRef<str>>(
        &self,
        prefixes: &[P],
        address: &[u8],
    ) -> Result<Option<(String, AddressRange)>> {
        for prefix in prefixes.iter().map(|p| p.as_ref()) {
            let range = self.require_range(prefix)?;
            range
                .codec()
                .check_width(address)
                .map_err(AllocError::invalid_address(prefix))?;
            if range.contains(address) {
                return Ok(Some((prefix.to_string(), range)));
            }
        }
        Ok(None)
    }

    /// First range in `prefixes` where `name` is bound
    pub fn find_name_across_ranges<P: AsRef<str>>(
        &self,
        name: &str,
        prefixes: &[P],
    ) -> Result<Option<Placement>> {
        for prefix in prefixes.iter().map(|p| p.as_ref()) {
            if let Some(Binding { address, kind }) = self.get_address_details(prefix, name)? {
                return Ok(Some(Placement {
                    prefix: prefix.to_string(),
                    address,
                    kind,
                }));
            }
        }
        Ok(None)
    }

    /// Generate an address for `name` in the first range of `prefixes` that
    /// has room, keeping the name unique across all of them.
    pub fn generate_with_validation<P: AsRef<str>>(
        &self,
        name: &str,
        prefixes: &[P],
        range_type: RangeType,
        policy: Policy,
    ) -> Result<Allocation> {
        if prefixes.is_empty() {
            return Err(AllocError::NoRanges {
                name: name.to_string(),
            });
        }

        if let Some(existing) = self.find_name_across_ranges(name, prefixes)? {
            let range = self.require_typed(&existing.prefix, range_type)?;
            if !policy.is_tolerant() {
                return Err(AllocError::AlreadyAssigned {
                    prefix: existing.prefix,
                    name: name.to_string(),
                    address: Some(range.format(&existing.address)),
                });
            }
            if existing.kind != AllocationKind::Generated {
                return Err(AllocError::BindingMismatch {
                    prefix: existing.prefix,
                    name: name.to_string(),
                    reason: format!("expected a generated address, found a {} one", existing.kind),
                });
            }

            warn!(
                "Address '{}' already exists in range '{}' as {}, keeping it",
                name,
                existing.prefix,
                range.format(&existing.address)
            );
            return Ok(Allocation {
                prefix: existing.prefix,
                address: existing.address,
                pre_existing: true,
            });
        }

        for prefix in prefixes.iter().map(|p| p.as_ref()) {
            self.require_typed(prefix, range_type)?;
            match self.create_generated(prefix, name, prefixes)? {
                Generated::Assigned(address) => {
                    return Ok(Allocation {
                        prefix: prefix.to_string(),
                        address,
                        pre_existing: false,
                    })
                }
                Generated::RangeFull => continue,
            }
        }

        Err(AllocError::RangesExhausted {
            name: name.to_string(),
            prefixes: prefixes.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    /// Bind `address` to `name` in whichever range of `prefixes` contains it
    pub fn hardcode_with_validation<P: AsRef<str>>(
        &self,
        name: &str,
        prefixes: &[P],
        address: &[u8],
        range_type: RangeType,
        policy: Policy,
    ) -> Result<Allocation> {
        if prefixes.is_empty() {
            return Err(AllocError::NoRanges {
                name: name.to_string(),
            });
        }

        let Some((prefix, _)) = self.find_range_by_address(prefixes, address)? else {
            let joined: Vec<&str> = prefixes.iter().map(|p| p.as_ref()).collect();
            return Err(AllocError::OutOfBounds {
                prefix: joined.join(", "),
                address: range_type.codec().format(address),
            });
        };
        let range = self.require_typed(&prefix, range_type)?;

        if let Some(existing) = self.get_address_details(&prefix, name)? {
            if !policy.is_tolerant() {
                return Err(AllocError::AlreadyAssigned {
                    prefix,
                    name: name.to_string(),
                    address: Some(range.format(&existing.address)),
                });
            }
            if existing.kind != AllocationKind::Hardcoded {
                return Err(AllocError::BindingMismatch {
                    prefix,
                    name: name.to_string(),
                    reason: format!("expected a hardcoded address, found a {} one", existing.kind),
                });
            }
            if existing.address != address {
                return Err(AllocError::BindingMismatch {
                    prefix,
                    name: name.to_string(),
                    reason: format!(
                        "bound to {}, requested {}",
                        range.format(&existing.address),
                        range.format(address)
                    ),
                });
            }

            warn!("Hardcoded address '{}' already exists in range '{}'", name, prefix);
            return Ok(Allocation {
                prefix,
                address: existing.address,
                pre_existing: true,
            });
        }

        self.create_hardcoded(&prefix, name, address)?;
        Ok(Allocation {
            prefix,
            address: address.to_vec(),
            pre_existing: false,
        })
    }

    /// Address bound to `name` in a range of the expected type.
    ///
    /// A missing name is an error under [`Policy::Strict`] and `None` under
    /// [`Policy::Tolerant`].
    pub fn get_address_with_validation(
        &self,
        name: &str,
        prefix: &str,
        range_type: RangeType,
        policy: Policy,
    ) -> Result<Option<Vec<u8>>> {
        let binding = self.get_binding_with_validation(name, prefix, range_type, policy)?;
        Ok(binding.map(|binding| binding.address))
    }

    /// Like [`Allocator::get_address_with_validation`], with the allocation
    /// kind read in the same lookup
    pub fn get_binding_with_validation(
        &self,
        name: &str,
        prefix: &str,
        range_type: RangeType,
        policy: Policy,
    ) -> Result<Option<Binding>> {
        self.require_typed(prefix, range_type)?;
        match self.get_address_details(prefix, name)? {
            Some(binding) => Ok(Some(binding)),
            None if policy.is_tolerant() => Ok(None),
            None => Err(AllocError::NameNotFound {
                prefix: prefix.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Delete the binding of `name` after checking it is the one the caller
    /// expects. Returns whether a binding existed.
    pub fn delete_with_validation(
        &self,
        name: &str,
        prefix: &str,
        kind: AllocationKind,
        address: &[u8],
        policy: Policy,
    ) -> Result<bool> {
        let Some(existing) = self.get_address_details(prefix, name)? else {
            if policy.is_tolerant() {
                warn!("Address '{}' is already gone from range '{}'", name, prefix);
                return Ok(false);
            }
            return Err(AllocError::NameNotFound {
                prefix: prefix.to_string(),
                name: name.to_string(),
            });
        };

        if existing.kind != kind {
            return Err(AllocError::BindingMismatch {
                prefix: prefix.to_string(),
                name: name.to_string(),
                reason: format!("expected a {} address, found a {} one", kind, existing.kind),
            });
        }
        if existing.address != address {
            return Err(AllocError::BindingMismatch {
                prefix: prefix.to_string(),
                name: name.to_string(),
                reason: format!(
                    "bound to {}, expected {}",
                    self.format_in(prefix, &existing.address),
                    self.format_in(prefix, address)
                ),
            });
        }

        match kind {
            AllocationKind::Hardcoded => self.delete_hardcoded(prefix, name, address)?,
            AllocationKind::Generated => self.delete_generated(prefix, name, address)?,
        }
        Ok(true)
    }

    fn require_typed(&self, prefix: &str, range_type: RangeType) -> Result<AddressRange> {
        let range = self.require_range(prefix)?;
        if range.range_type != range_type {
            return Err(AllocError::TypeMismatch {
                prefix: prefix.to_string(),
                expected: range_type,
                actual: range.range_type,
            });
        }
        Ok(range)
    }
}
