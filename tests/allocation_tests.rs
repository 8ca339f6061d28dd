#[cfg(test)]
mod allocation_tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use tempfile::TempDir;

    use netaddr::address::{self, RangeType};
    use netaddr::allocator::{
        AddressRange, AllocationKind, Allocator, EngineSettings, Generated, Policy, RetryPolicy,
    };
    use netaddr::error::AllocError;
    use netaddr::store::{FileStore, KvStore, MemoryStore};

    const LAN: &str = "/netaddr/lan/";

    fn settings(retries: u32) -> EngineSettings {
        EngineSettings {
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                retries,
                delay: Duration::from_millis(1),
            },
        }
    }

    fn ip(text: &str) -> Vec<u8> {
        RangeType::Ipv4.codec().parse(text).unwrap()
    }

    fn with_range<S: KvStore>(store: S, first: &str, last: &str) -> Allocator<S> {
        let allocator = Allocator::new(store, settings(3));
        let range = AddressRange::parse(RangeType::Ipv4, first, last).unwrap();
        allocator.create_range(LAN, &range).unwrap();
        allocator
    }

    /// Check the one-to-one mapping between names and registry entries
    fn assert_consistent<S: KvStore>(allocator: &Allocator<S>, prefix: &str) {
        let keyspace = allocator.keyspace(prefix).unwrap();

        let mut owners: HashMap<Vec<u8>, String> = HashMap::new();
        for entry in keyspace.hardcoded.iter().chain(&keyspace.generated).chain(&keyspace.deleted) {
            assert!(
                owners.insert(entry.address.clone(), entry.name.clone()).is_none(),
                "address {:?} appears in more than one registry",
                entry.address
            );
            assert!(keyspace.range.contains(&entry.address));
        }

        let deleted: HashSet<&Vec<u8>> = keyspace.deleted.iter().map(|e| &e.address).collect();
        for entry in &keyspace.names {
            assert!(!deleted.contains(&entry.address));
            assert_eq!(owners.get(&entry.address), Some(&entry.name));
        }
        assert_eq!(
            keyspace.names.len(),
            keyspace.hardcoded.len() + keyspace.generated.len()
        );
    }

    #[test]
    fn test_concrete_scenario() {
        let allocator = with_range(MemoryStore::new(), "10.0.0.4", "10.0.0.6");
        assert_eq!(allocator.usage(LAN).unwrap().capacity, 3);

        for (name, expected) in [("a", "10.0.0.4"), ("b", "10.0.0.5"), ("c", "10.0.0.6")] {
            let generated = allocator.create_generated(LAN, name, &[LAN]).unwrap();
            assert_eq!(generated, Generated::Assigned(ip(expected)));
        }
        let generated = allocator.create_generated(LAN, "d", &[LAN]).unwrap();
        assert_eq!(generated, Generated::RangeFull);

        allocator.delete_generated(LAN, "b", &ip("10.0.0.5")).unwrap();
        let generated = allocator.create_generated(LAN, "e", &[LAN]).unwrap();
        assert_eq!(generated, Generated::Assigned(ip("10.0.0.5")));

        assert_consistent(&allocator, LAN);
        assert_eq!(allocator.usage(LAN).unwrap().free, 0);
    }

    #[test]
    fn test_exhaustion_after_capacity_calls() {
        let allocator = with_range(MemoryStore::new(), "10.128.60.190", "10.128.60.254");
        let capacity = allocator.usage(LAN).unwrap().capacity;
        assert_eq!(capacity, 65);

        let mut seen = HashSet::new();
        for n in 0..capacity {
            let address = allocator.create_generated_address(LAN, &format!("host-{}", n)).unwrap();
            assert!(seen.insert(address));
        }
        assert!(matches!(
            allocator.create_generated_address(LAN, "one-too-many"),
            Err(AllocError::RangeFull { .. })
        ));
    }

    #[test]
    fn test_capacity_across_octets() {
        let range = AddressRange::parse(RangeType::Ipv4, "10.128.50.254", "10.128.60.190").unwrap();
        assert_eq!(range.capacity(), 2 + 191 + 9 * 256);

        let everything =
            AddressRange::parse(RangeType::Ipv6, "::", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff")
                .unwrap();
        assert_eq!(everything.capacity(), u128::MAX);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let allocator = with_range(MemoryStore::new(), "10.0.0.1", "10.0.0.30");
        let mut rng = StdRng::seed_from_u64(7);
        let mut bound: Vec<(String, Vec<u8>)> = Vec::new();
        let mut last_cursor = allocator.keyspace(LAN).unwrap().next_address;

        for step in 0..60 {
            if step % 3 == 2 && !bound.is_empty() {
                bound.shuffle(&mut rng);
                if let Some((name, address)) = bound.pop() {
                    allocator.delete_generated(LAN, &name, &address).unwrap();
                }
            } else {
                let name = format!("n{}", step);
                let generated = allocator.create_generated(LAN, &name, &[LAN]).unwrap();
                if let Generated::Assigned(address) = generated {
                    bound.push((name, address));
                }
            }

            let cursor = allocator.keyspace(LAN).unwrap().next_address;
            assert_ne!(address::compare(&cursor, &last_cursor), std::cmp::Ordering::Less);
            last_cursor = cursor;
        }
        assert_consistent(&allocator, LAN);
    }

    #[test]
    fn test_mac_generation_crosses_octet() {
        let allocator = Allocator::new(MemoryStore::new(), settings(3));
        let range =
            AddressRange::parse(RangeType::Mac, "52:54:00:00:00:fe", "52-54-00-00-01-01").unwrap();
        allocator.create_range("/netaddr/macs/", &range).unwrap();

        let formatted: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| {
                let address = allocator.create_generated_address("/netaddr/macs/", name).unwrap();
                range.format(&address)
            })
            .collect();
        assert_eq!(
            formatted,
            ["52:54:00:00:00:fe", "52:54:00:00:00:ff", "52:54:00:00:01:00", "52:54:00:00:01:01"]
        );
    }

    #[test]
    fn test_ipv6_generation_and_hardcode() {
        let allocator = Allocator::new(MemoryStore::new(), settings(3));
        let range = AddressRange::parse(RangeType::Ipv6, "fd00::1", "fd00::ff").unwrap();
        allocator.create_range("/netaddr/v6/", &range).unwrap();

        let codec = RangeType::Ipv6.codec();
        let gateway = codec.parse("fd00::1").unwrap();
        allocator
            .hardcode_with_validation(
                "gw",
                &["/netaddr/v6/"],
                &gateway,
                RangeType::Ipv6,
                Policy::Strict,
            )
            .unwrap();
        let allocation = allocator
            .generate_with_validation("web", &["/netaddr/v6/"], RangeType::Ipv6, Policy::Strict)
            .unwrap();
        assert_eq!(codec.format(&allocation.address), "fd00::2");
    }

    #[test]
    fn test_tolerant_create_is_idempotent() {
        let allocator = with_range(MemoryStore::new(), "10.0.0.4", "10.0.0.6");
        let first = allocator
            .generate_with_validation("web", &[LAN], RangeType::Ipv4, Policy::Tolerant)
            .unwrap();
        let second = allocator
            .generate_with_validation("web", &[LAN], RangeType::Ipv4, Policy::Tolerant)
            .unwrap();
        assert_eq!(first.address, second.address);
        assert!(second.pre_existing);
        assert_eq!(allocator.usage(LAN).unwrap().used, 1);

        let address = ip("10.0.0.6");
        for _ in 0..2 {
            let allocation = allocator
                .hardcode_with_validation("db", &[LAN], &address, RangeType::Ipv4, Policy::Tolerant)
                .unwrap();
            assert_eq!(allocation.address, address);
        }
        assert!(allocator
            .hardcode_with_validation(
                "db",
                &[LAN],
                &ip("10.0.0.5"),
                RangeType::Ipv4,
                Policy::Tolerant,
            )
            .is_err());
    }

    #[test]
    fn test_delete_then_tolerant_delete() {
        let allocator = with_range(MemoryStore::new(), "10.0.0.4", "10.0.0.6");
        allocator.create_hardcoded(LAN, "db", &ip("10.0.0.6")).unwrap();

        let address = ip("10.0.0.6");
        let kind = AllocationKind::Hardcoded;
        assert!(allocator
            .delete_with_validation("db", LAN, kind, &address, Policy::Strict)
            .unwrap());
        assert!(!allocator
            .delete_with_validation("db", LAN, kind, &address, Policy::Tolerant)
            .unwrap());
        assert_consistent(&allocator, LAN);
    }

    #[test]
    fn test_transient_failures_use_transport_budget() {
        let store = Arc::new(MemoryStore::new());
        let allocator = with_range(Arc::clone(&store), "10.0.0.4", "10.0.0.6");

        store.fail_next(3);
        assert_eq!(allocator.create_generated_address(LAN, "a").unwrap(), ip("10.0.0.4"));

        store.fail_next(50);
        let err = allocator.create_generated_address(LAN, "b").unwrap_err();
        assert!(err.is_connectivity(), "{}", err);

        // Nothing was half applied
        store.fail_next(0);
        assert!(allocator.find_name(LAN, "b").unwrap().is_none());
        assert_consistent(&allocator, LAN);
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let store = Arc::new(MemoryStore::new());
        let setup = with_range(Arc::clone(&store), "10.1.0.1", "10.1.0.40");

        let results: Vec<Vec<u8>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        let allocator = Allocator::new(store, settings(1000));
                        (0..5)
                            .map(|n| {
                                allocator
                                    .create_generated_address(LAN, &format!("w{}-{}", worker, n))
                                    .unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.len(), 40);
        let unique: HashSet<_> = results.iter().collect();
        assert_eq!(unique.len(), 40);
        assert!(matches!(
            setup.create_generated_address(LAN, "late"),
            Err(AllocError::RangeFull { .. })
        ));
        assert_consistent(&setup, LAN);
    }

    #[test]
    fn test_concurrent_mixed_workload_keeps_bimap() {
        let store = Arc::new(MemoryStore::new());
        let setup = with_range(Arc::clone(&store), "10.2.0.1", "10.2.0.64");

        let mut hardcoded: Vec<u8> = (1..=64).collect();
        hardcoded.shuffle(&mut StdRng::seed_from_u64(42));
        hardcoded.truncate(16);

        thread::scope(|scope| {
            for worker in 0..4 {
                let store = Arc::clone(&store);
                let picks: Vec<u8> = hardcoded[worker * 4..worker * 4 + 4].to_vec();
                scope.spawn(move || {
                    let allocator = Allocator::new(store, settings(1000));
                    for (n, last) in picks.into_iter().enumerate() {
                        let name = format!("h{}-{}", worker, n);
                        match allocator.create_hardcoded(LAN, &name, &[10, 2, 0, last]) {
                            Ok(()) | Err(AllocError::AlreadyAssigned { .. }) => {}
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                        let generated = format!("g{}-{}", worker, n);
                        let address = allocator.create_generated_address(LAN, &generated).unwrap();
                        if n % 2 == 0 {
                            allocator.delete_generated(LAN, &generated, &address).unwrap();
                        }
                    }
                });
            }
        });

        assert_consistent(&setup, LAN);
    }

    #[test]
    fn test_file_store_persists_between_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ranges.bin");

        {
            let allocator = with_range(FileStore::open(&path).unwrap(), "10.0.0.4", "10.0.0.6");
            allocator.create_generated_address(LAN, "a").unwrap();
            allocator.create_hardcoded(LAN, "db", &ip("10.0.0.6")).unwrap();
        }

        let reopened = Allocator::new(FileStore::open(&path).unwrap(), settings(3));
        assert_eq!(reopened.get_address(LAN, "a").unwrap(), ip("10.0.0.4"));
        let binding = reopened.get_address_details(LAN, "db").unwrap().unwrap();
        assert_eq!(binding.kind, AllocationKind::Hardcoded);
        assert_eq!(reopened.create_generated_address(LAN, "b").unwrap(), ip("10.0.0.5"));
        let range = AddressRange::parse(RangeType::Ipv4, "10.0.0.4", "10.0.0.6").unwrap();
        assert!(matches!(
            reopened.create_range(LAN, &range),
            Err(AllocError::RangeExists { .. })
        ));
    }

    #[test]
    fn test_file_store_shared_between_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.bin");
        let setup = with_range(FileStore::open(&path).unwrap(), "10.3.0.1", "10.3.0.50");

        let results: Vec<Vec<u8>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|worker| {
                    let path = path.clone();
                    scope.spawn(move || {
                        let store = FileStore::open(&path).unwrap();
                        let allocator = Allocator::new(store, settings(1000));
                        (0..5)
                            .map(|n| {
                                allocator
                                    .create_generated_address(LAN, &format!("f{}-{}", worker, n))
                                    .unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = results.iter().collect();
        assert_eq!(unique.len(), 20);
        assert_eq!(setup.usage(LAN).unwrap().used, 20);
        assert_consistent(&setup, LAN);
    }

    #[test]
    fn test_destroy_and_recreate() {
        let allocator = with_range(MemoryStore::new(), "10.0.0.4", "10.0.0.6");
        allocator.create_generated_address(LAN, "a").unwrap();
        allocator.destroy_range(LAN).unwrap();

        assert!(allocator.get_range(LAN).unwrap().is_none());
        assert!(allocator.list_names(LAN).unwrap().is_empty());

        let range = AddressRange::parse(RangeType::Ipv4, "10.9.0.1", "10.9.0.2").unwrap();
        allocator.create_range(LAN, &range).unwrap();
        assert_eq!(allocator.create_generated_address(LAN, "a").unwrap(), ip("10.9.0.1"));
    }
}
