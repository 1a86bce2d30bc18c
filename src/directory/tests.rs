//! Replica Directory Tests
//!
//! ## Test Scopes
//! - **Identity parsing**: registration payloads, signed ids, malformed input.
//! - **Ring arithmetic**: unsigned comparison and wraparound.
//! - **Capacity**: drops, reconnection overwrites, latch behaviour.

#[cfg(test)]
mod tests {
    use crate::directory::{
        QuorumLatch, Registration, ReplicaDirectory, ReplicaIdentity, hash_to_64bit,
    };
    use crate::error::KvError;
    use std::sync::Arc;
    use std::time::Duration;

    fn replica(id: u64) -> ReplicaIdentity {
        ReplicaIdentity::new(id, "localhost", 8000 + (id % 1000) as u16)
    }

    // ============================================================
    // IDENTITY PARSING
    // ============================================================

    #[test]
    fn test_parse_registration_payload() {
        let parsed: ReplicaIdentity = "42@node-a.local:9090".parse().unwrap();
        assert_eq!(parsed, ReplicaIdentity::new(42, "node-a.local", 9090));
        assert_eq!(parsed.address(), "node-a.local:9090");
    }

    #[test]
    fn test_negative_id_is_reinterpreted_unsigned() {
        let parsed: ReplicaIdentity = "-1@host:1".parse().unwrap();
        assert_eq!(parsed.id, u64::MAX);

        // Display emits the signed form, which parses back to the same id.
        let again: ReplicaIdentity = parsed.to_string().parse().unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_malformed_payloads_are_invalid_format() {
        for bad in [
            "",
            "42",
            "42@host",
            "@host:1",
            "x@host:1",
            "42@:1",
            "42@host:port",
            "42@host:70000",
        ] {
            assert_eq!(
                bad.parse::<ReplicaIdentity>(),
                Err(KvError::InvalidFormat),
                "payload {:?}",
                bad
            );
        }
    }

    // ============================================================
    // RING ARITHMETIC
    // ============================================================

    #[test]
    fn test_hash_is_deterministic_and_order_dependent() {
        assert_eq!(hash_to_64bit("foo"), hash_to_64bit("foo"));
        assert_ne!(hash_to_64bit("ab"), hash_to_64bit("ba"));
        assert_eq!(hash_to_64bit(""), 1_125_899_906_842_597);
    }

    #[test]
    fn test_first_replica_is_next_id_at_or_after_hash() {
        let directory = ReplicaDirectory::new(2);
        directory.register(replica(10));
        directory.register(replica(20));

        assert_eq!(directory.replica_for_hash(15).unwrap().id, 20);
        assert_eq!(directory.replica_for_hash(20).unwrap().id, 20);
        assert_eq!(directory.replica_for_hash(10).unwrap().id, 10);
        assert_eq!(directory.replica_for_hash(5).unwrap().id, 10);
        assert_eq!(directory.replica_for_hash(25).unwrap().id, 10, "wraps to smallest");
    }

    #[test]
    fn test_successor_wraps_to_smallest() {
        let directory = ReplicaDirectory::new(2);
        directory.register(replica(10));
        directory.register(replica(20));

        assert_eq!(directory.find_successor(&replica(10)).unwrap().id, 20);
        assert_eq!(directory.find_successor(&replica(20)).unwrap().id, 10);
    }

    #[test]
    fn test_ids_compare_unsigned() {
        // As signed values these would be -6 and -1, i.e. below 100.
        let high = u64::MAX - 5;
        let directory = ReplicaDirectory::new(3);
        directory.register(replica(10));
        directory.register(replica(high));
        directory.register(replica(u64::MAX));

        assert_eq!(directory.replica_for_hash(100).unwrap().id, high);
        assert_eq!(directory.find_successor(&replica(high)).unwrap().id, u64::MAX);
        assert_eq!(directory.find_successor(&replica(u64::MAX)).unwrap().id, 10);
        assert_eq!(directory.replica_for_hash(u64::MAX).unwrap().id, u64::MAX);
    }

    #[test]
    fn test_owners_pair_primary_with_successor() {
        let directory = ReplicaDirectory::new(3);
        for id in [100, u64::MAX / 2, u64::MAX - 1] {
            directory.register(replica(id));
        }

        for key in ["foo", "bar", "baz", "a much longer key"] {
            let (primary, backup) = directory.owners(key).unwrap();
            assert_eq!(primary, directory.find_first_replica(key).unwrap());
            assert_eq!(backup, directory.find_successor(&primary).unwrap());
            assert_ne!(primary.id, backup.id);
        }
    }

    #[test]
    fn test_single_replica_is_its_own_successor() {
        let directory = ReplicaDirectory::new(1);
        directory.register(replica(7));
        let (primary, backup) = directory.owners("anything").unwrap();
        assert_eq!(primary.id, 7);
        assert_eq!(backup.id, 7);
    }

    #[test]
    fn test_empty_directory_has_no_owner() {
        let directory = ReplicaDirectory::new(2);
        assert!(directory.find_first_replica("foo").is_none());
        assert!(directory.owners("foo").is_none());
    }

    // ============================================================
    // CAPACITY AND QUORUM
    // ============================================================

    #[test]
    fn test_registration_beyond_capacity_is_dropped() {
        let directory = ReplicaDirectory::new(2);
        assert_eq!(directory.register(replica(1)), Registration::Added);
        assert_eq!(directory.register(replica(2)), Registration::Added);
        assert_eq!(directory.register(replica(3)), Registration::Dropped);

        assert_eq!(directory.registered_count(), 2);
        assert!(directory.get(3).is_none());
    }

    #[test]
    fn test_reregistration_overwrites_address_even_when_full() {
        let directory = ReplicaDirectory::new(2);
        directory.register(replica(1));
        directory.register(replica(2));

        let moved = ReplicaIdentity::new(2, "elsewhere", 9999);
        assert_eq!(directory.register(moved.clone()), Registration::Replaced);
        assert_eq!(directory.get(2), Some(moved));
        assert_eq!(directory.registered_count(), 2);
    }

    #[test]
    fn test_quorum_opens_exactly_at_capacity() {
        let directory = ReplicaDirectory::new(2);
        assert!(!directory.quorum().is_open());

        directory.register(replica(1));
        directory.register(replica(1));
        assert!(!directory.quorum().is_open(), "same id twice is one replica");

        directory.register(replica(2));
        assert!(directory.quorum().is_open());

        directory.register(replica(2));
        directory.register(replica(3));
        assert!(directory.quorum().is_open(), "never regresses");
    }

    #[tokio::test]
    async fn test_waiters_are_released_when_quorum_forms() {
        let directory = Arc::new(ReplicaDirectory::new(2));
        directory.register(replica(1));

        let waiter = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.wait_for_quorum().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        directory.register(replica(2));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not released")
            .unwrap();

        // Later waiters pass straight through.
        tokio::time::timeout(Duration::from_millis(50), directory.wait_for_quorum())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_latch_open_is_idempotent() {
        let latch = QuorumLatch::new();
        latch.open();
        latch.open();
        assert!(latch.is_open());
        tokio::time::timeout(Duration::from_millis(50), latch.wait())
            .await
            .unwrap();
    }
}
