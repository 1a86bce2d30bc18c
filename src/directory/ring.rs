use super::barrier::QuorumLatch;
use super::types::ReplicaIdentity;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// 64-bit polynomial rolling hash over UTF-16 code units.
///
/// Order-dependent and cheap; it only has to spread keys over the ring.
pub fn hash_to_64bit(key: &str) -> u64 {
    key.encode_utf16().fold(1_125_899_906_842_597u64, |h, unit| {
        h.wrapping_mul(31).wrapping_add(unit as u64)
    })
}

/// What happened to a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// Known id reconnecting, possibly from a new address.
    Replaced,
    /// Unknown id arriving after the directory filled up.
    Dropped,
}

/// Bounded id -> replica map with consistent-hash lookups.
pub struct ReplicaDirectory {
    capacity: usize,
    replicas: RwLock<BTreeMap<u64, ReplicaIdentity>>,
    quorum: QuorumLatch,
}

impl ReplicaDirectory {
    pub fn new(capacity: usize) -> Self {
        let quorum = QuorumLatch::new();
        if capacity == 0 {
            quorum.open();
        }

        Self {
            capacity,
            replicas: RwLock::new(BTreeMap::new()),
            quorum,
        }
    }

    /// Adds or replaces a replica. Opens the quorum latch the first time the
    /// directory reaches capacity.
    pub fn register(&self, replica: ReplicaIdentity) -> Registration {
        let id = replica.id;
        let (outcome, count) = {
            let mut replicas = self.replicas.write();
            let outcome = if replicas.contains_key(&id) {
                replicas.insert(id, replica);
                Registration::Replaced
            } else if replicas.len() < self.capacity {
                replicas.insert(id, replica);
                Registration::Added
            } else {
                Registration::Dropped
            };
            (outcome, replicas.len())
        };

        match outcome {
            Registration::Added => {
                tracing::info!(
                    "Registered replica #{} ({}/{})",
                    id,
                    count,
                    self.capacity
                );
            }
            Registration::Replaced => {
                tracing::info!("Replica #{} re-registered", id);
            }
            Registration::Dropped => {
                tracing::debug!("Directory full, dropping registration of #{}", id);
            }
        }

        if count == self.capacity && !self.quorum.is_open() {
            tracing::info!("All {} replicas registered", self.capacity);
            self.quorum.open();
        }

        outcome
    }

    /// Primary replica for `key`.
    pub fn find_first_replica(&self, key: &str) -> Option<ReplicaIdentity> {
        self.replica_for_hash(hash_to_64bit(key))
    }

    /// The replica with the smallest id `>= hash` (unsigned), wrapping to the
    /// smallest registered id.
    pub fn replica_for_hash(&self, hash: u64) -> Option<ReplicaIdentity> {
        let replicas = self.replicas.read();
        replicas
            .range(hash..)
            .next()
            .or_else(|| replicas.iter().next())
            .map(|(_, replica)| replica.clone())
    }

    /// The replica with the next-higher id after `replica`, wrapping to the
    /// smallest registered id. With a single replica that is itself.
    pub fn find_successor(&self, replica: &ReplicaIdentity) -> Option<ReplicaIdentity> {
        let replicas = self.replicas.read();
        replicas
            .range((Excluded(replica.id), Unbounded))
            .next()
            .or_else(|| replicas.iter().next())
            .map(|(_, next)| next.clone())
    }

    /// Primary and backup for `key`.
    pub fn owners(&self, key: &str) -> Option<(ReplicaIdentity, ReplicaIdentity)> {
        let primary = self.find_first_replica(key)?;
        let backup = self.find_successor(&primary)?;
        Some((primary, backup))
    }

    pub fn get(&self, id: u64) -> Option<ReplicaIdentity> {
        self.replicas.read().get(&id).cloned()
    }

    pub fn registered_count(&self) -> usize {
        self.replicas.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn quorum(&self) -> &QuorumLatch {
        &self.quorum
    }

    /// Blocks until all expected replicas have registered.
    pub async fn wait_for_quorum(&self) {
        self.quorum.wait().await;
    }
}
