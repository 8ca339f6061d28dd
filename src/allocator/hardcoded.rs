//! Hardcoded allocator: pin a caller chosen address to a name.

use super::keys::{RangeKeys, RegistryKeys};
use super::retry::Attempt;
use super::Allocator;
use crate::address;
use crate::error::{AllocError, Result};
use crate::store::{Guard, KvStore, Txn};
use log::{debug, info};
use std::cmp::Ordering;

impl<S: KvStore> Allocator<S> {
    /// Bind `address` to `name` in the range at `prefix`.
    ///
    /// The address must lie within the range boundaries and be free. If it
    /// sits in the deleted pool it is taken out of it in the same
    /// transaction.
    pub fn create_hardcoded(&self, prefix: &str, name: &str, address: &[u8]) -> Result<()> {
        let range = self.require_range(prefix)?;
        let codec = range.codec();
        codec
            .check_width(address)
            .map_err(AllocError::invalid_address(prefix))?;

        let formatted = codec.format(address);
        if !range.contains(address) {
            return Err(AllocError::OutOfBounds {
                prefix: prefix.to_string(),
                address: formatted,
            });
        }

        let keys = RegistryKeys::new(prefix);
        let hardcoded_key = keys.hardcoded_key(address);
        let generated_key = keys.generated_key(address);
        let deleted_key = keys.deleted_key(address);
        let name_key = keys.name_key(name);

        let already_assigned = || AllocError::AlreadyAssigned {
            prefix: prefix.to_string(),
            name: name.to_string(),
            address: Some(formatted.clone()),
        };

        let outcome = self
            .settings
            .retry
            .optimistic("create hardcoded", |_| -> Result<Attempt<bool>> {
                let reclaimed = self.is_deleted(prefix, address)?;

                let txn = if reclaimed {
                    Txn::new()
                        .when(Guard::Present(deleted_key.clone()))
                        .delete(deleted_key.clone())
                } else {
                    Txn::new().when(Guard::Absent(deleted_key.clone()))
                };
                let txn = txn
                    .when(Guard::Absent(hardcoded_key.clone()))
                    .when(Guard::Absent(generated_key.clone()))
                    .when(Guard::Absent(name_key.clone()))
                    .put(hardcoded_key.clone(), name)
                    .put(name_key.clone(), address);

                if self.commit(prefix, &txn)? {
                    return Ok(Attempt::Done(reclaimed));
                }

                // Lost a race. Only a change to the deleted pool is worth another try.
                if self.exists(prefix, &name_key)?
                    || self.exists(prefix, &hardcoded_key)?
                    || self.exists(prefix, &generated_key)?
                {
                    return Err(already_assigned());
                }
                Ok(Attempt::Conflict)
            })?;

        match outcome {
            Some(reclaimed) => {
                info!(
                    "Hardcoded {} to '{}' in range '{}'{}",
                    formatted,
                    name,
                    prefix,
                    if reclaimed { " (reclaimed from deleted pool)" } else { "" }
                );
                Ok(())
            }
            None => Err(already_assigned()),
        }
    }

    /// Release the hardcoded `address` held by `name`.
    ///
    /// Addresses the cursor has not reached yet are simply dropped, since
    /// generation will offer them naturally. Addresses below the cursor go
    /// to the deleted pool so that generation can reuse them.
    pub fn delete_hardcoded(&self, prefix: &str, name: &str, address: &[u8]) -> Result<()> {
        let range_keys = RangeKeys::new(prefix);
        let keys = RegistryKeys::new(prefix);
        let hardcoded_key = keys.hardcoded_key(address);
        let deleted_key = keys.deleted_key(address);
        let name_key = keys.name_key(name);

        let not_assigned = || AllocError::NotAssigned {
            prefix: prefix.to_string(),
            name: name.to_string(),
            address: self.format_in(prefix, address),
        };

        let held = [
            Guard::ValueEquals(hardcoded_key.clone(), name.as_bytes().to_vec()),
            Guard::ValueEquals(name_key.clone(), address.to_vec()),
        ];

        let outcome = self
            .settings
            .retry
            .optimistic("delete hardcoded", |_| -> Result<Attempt<bool>> {
                let (cursor, version) = self.read_cursor(prefix)?;

                if address::compare(address, &cursor) != Ordering::Less {
                    let txn = Txn::new()
                        .when(Guard::VersionEquals(range_keys.next.clone(), version))
                        .when_all(held.clone())
                        .delete(hardcoded_key.clone())
                        .delete(name_key.clone());

                    if self.commit(prefix, &txn)? {
                        return Ok(Attempt::Done(false));
                    }

                    // Retry only if the cursor moved under us
                    let (_, current) = self.read_cursor(prefix)?;
                    if current == version {
                        return Err(not_assigned());
                    }
                    debug!("Cursor of '{}' moved while releasing '{}'", prefix, name);
                    return Ok(Attempt::Conflict);
                }

                let txn = Txn::new()
                    .when(Guard::Absent(deleted_key.clone()))
                    .when_all(held.clone())
                    .delete(hardcoded_key.clone())
                    .delete(name_key.clone())
                    .put(deleted_key.clone(), name);

                if self.commit(prefix, &txn)? {
                    Ok(Attempt::Done(true))
                } else {
                    Err(not_assigned())
                }
            })?;

        match outcome {
            Some(reclaimable) => {
                info!(
                    "Released hardcoded address of '{}' in range '{}'{}",
                    name,
                    prefix,
                    if reclaimable { " into the deleted pool" } else { "" }
                );
                Ok(())
            }
            None => Err(not_assigned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::testing::{interleaved, ipv4, ipv4_range, PREFIX};
    use crate::allocator::Generated;

    #[test]
    fn test_boundaries_are_inclusive() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "first", &ipv4("10.0.0.4")).unwrap();
        allocator.create_hardcoded(PREFIX, "last", &ipv4("10.0.0.6")).unwrap();

        for outside in ["10.0.0.3", "10.0.0.7"] {
            let err = allocator
                .create_hardcoded(PREFIX, "outside", &ipv4(outside))
                .unwrap_err();
            assert!(matches!(err, AllocError::OutOfBounds { .. }), "{}", err);
        }
    }

    #[test]
    fn test_missing_range() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        let err = allocator
            .create_hardcoded("/netaddr/missing/", "web", &ipv4("10.0.0.4"))
            .unwrap_err();
        assert!(matches!(err, AllocError::RangeNotFound { .. }));
    }

    #[test]
    fn test_wrong_width_is_invalid() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        let err = allocator
            .create_hardcoded(PREFIX, "web", &[10, 0, 0, 4, 0, 0])
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidAddress { .. }));
    }

    #[test]
    fn test_duplicate_address_or_name() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "web", &ipv4("10.0.0.5")).unwrap();

        let err = allocator
            .create_hardcoded(PREFIX, "db", &ipv4("10.0.0.5"))
            .unwrap_err();
        assert!(matches!(err, AllocError::AlreadyAssigned { .. }));

        let err = allocator
            .create_hardcoded(PREFIX, "web", &ipv4("10.0.0.6"))
            .unwrap_err();
        assert!(matches!(err, AllocError::AlreadyAssigned { .. }));
    }

    #[test]
    fn test_cannot_hardcode_generated_address() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_generated_address(PREFIX, "web").unwrap();
        let err = allocator
            .create_hardcoded(PREFIX, "db", &ipv4("10.0.0.4"))
            .unwrap_err();
        assert!(matches!(err, AllocError::AlreadyAssigned { .. }));
    }

    #[test]
    fn test_hardcode_reclaims_deleted_address() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_generated_address(PREFIX, "web").unwrap();
        allocator.delete_generated(PREFIX, "web", &ipv4("10.0.0.4")).unwrap();
        assert!(allocator.is_deleted(PREFIX, &ipv4("10.0.0.4")).unwrap());

        allocator.create_hardcoded(PREFIX, "db", &ipv4("10.0.0.4")).unwrap();
        assert!(!allocator.is_deleted(PREFIX, &ipv4("10.0.0.4")).unwrap());
        assert!(allocator.is_hardcoded(PREFIX, &ipv4("10.0.0.4")).unwrap());
    }

    #[test]
    fn test_delete_ahead_of_cursor_leaves_no_deleted_entry() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "db", &ipv4("10.0.0.5")).unwrap();
        allocator.delete_hardcoded(PREFIX, "db", &ipv4("10.0.0.5")).unwrap();

        assert!(allocator.find_name(PREFIX, "db").unwrap().is_none());
        assert!(!allocator.is_deleted(PREFIX, &ipv4("10.0.0.5")).unwrap());

        // Generation walks onto it normally
        allocator.create_generated_address(PREFIX, "a").unwrap();
        assert_eq!(allocator.create_generated_address(PREFIX, "b").unwrap(), ipv4("10.0.0.5"));
    }

    #[test]
    fn test_delete_behind_cursor_goes_to_deleted_pool() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "db", &ipv4("10.0.0.4")).unwrap();
        // Cursor skips the hardcoded address and moves past it
        assert_eq!(allocator.create_generated_address(PREFIX, "web").unwrap(), ipv4("10.0.0.5"));

        allocator.delete_hardcoded(PREFIX, "db", &ipv4("10.0.0.4")).unwrap();
        assert!(allocator.is_deleted(PREFIX, &ipv4("10.0.0.4")).unwrap());

        let next = allocator.create_generated(PREFIX, "api", &[PREFIX]).unwrap();
        assert_eq!(next, Generated::Assigned(ipv4("10.0.0.4")));
    }

    #[test]
    fn test_delete_requires_matching_binding() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "db", &ipv4("10.0.0.5")).unwrap();
        allocator.create_hardcoded(PREFIX, "web", &ipv4("10.0.0.6")).unwrap();

        // Both entries exist, but they do not belong together
        let err = allocator
            .delete_hardcoded(PREFIX, "db", &ipv4("10.0.0.6"))
            .unwrap_err();
        assert!(matches!(err, AllocError::NotAssigned { .. }), "{}", err);
        assert!(allocator.find_name(PREFIX, "web").unwrap().is_some());

        let err = allocator
            .delete_hardcoded(PREFIX, "ghost", &ipv4("10.0.0.4"))
            .unwrap_err();
        assert!(err.to_string().contains("10.0.0.4"));
    }

    #[test]
    fn test_delete_restarts_when_cursor_moves() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(PREFIX, "h", &ipv4("10.0.0.4")).unwrap();

        // The cursor passes 10.0.0.4 between the cursor read and the commit
        let hardcoded_key = RegistryKeys::new(PREFIX).hardcoded_key(&ipv4("10.0.0.4"));
        let racing = interleaved(&allocator, hardcoded_key, |other| {
            assert_eq!(
                other.create_generated_address(PREFIX, "g").unwrap(),
                ipv4("10.0.0.5")
            );
        });
        racing.delete_hardcoded(PREFIX, "h", &ipv4("10.0.0.4")).unwrap();

        assert!(!allocator.is_hardcoded(PREFIX, &ipv4("10.0.0.4")).unwrap());
        assert!(allocator.is_deleted(PREFIX, &ipv4("10.0.0.4")).unwrap());
        assert_eq!(allocator.create_generated_address(PREFIX, "x").unwrap(), ipv4("10.0.0.4"));
    }

    #[test]
    fn test_create_restarts_when_address_enters_deleted_pool() {
        let allocator = ipv4_range("10.0.0.4", "10.0.0.6");

        // 10.0.0.4 is generated and released right before the hardcode commits
        let hardcoded_key = RegistryKeys::new(PREFIX).hardcoded_key(&ipv4("10.0.0.4"));
        let racing = interleaved(&allocator, hardcoded_key, |other| {
            let address = other.create_generated_address(PREFIX, "g").unwrap();
            other.delete_generated(PREFIX, "g", &address).unwrap();
        });
        racing.create_hardcoded(PREFIX, "db", &ipv4("10.0.0.4")).unwrap();

        assert!(allocator.is_hardcoded(PREFIX, &ipv4("10.0.0.4")).unwrap());
        assert!(!allocator.is_deleted(PREFIX, &ipv4("10.0.0.4")).unwrap());
        assert_eq!(allocator.find_name(PREFIX, "db").unwrap(), Some(ipv4("10.0.0.4")));
        assert_eq!(allocator.create_generated_address(PREFIX, "x").unwrap(), ipv4("10.0.0.5"));
    }
}
