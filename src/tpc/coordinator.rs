use super::types::{TransactionDecision, Vote};
use crate::cache::KvCache;
use crate::config::{CoordinatorConfig, RetryPolicy};
use crate::directory::{Registration, ReplicaDirectory, ReplicaIdentity};
use crate::error::{KvError, KvResult};
use crate::protocol::{KvMessage, Transport};
use crate::storage::validate_key;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// The single 2PC coordinator of the cluster.
///
/// Owns the replica directory and a result cache. Every transaction and
/// every read runs behind `txn_lock`, so at most one is in flight
/// cluster-wide.
pub struct Coordinator<T: Transport> {
    directory: ReplicaDirectory,
    cache: KvCache,
    transport: T,
    txn_lock: Mutex<()>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(config: &CoordinatorConfig, transport: T) -> Self {
        Self {
            directory: ReplicaDirectory::new(config.num_replicas),
            cache: KvCache::new(config.cache_sets, config.cache_set_size),
            transport,
            txn_lock: Mutex::new(()),
            timeout: config.timeout,
            retry: config.retry,
        }
    }

    pub fn directory(&self) -> &ReplicaDirectory {
        &self.directory
    }

    pub fn cache(&self) -> &KvCache {
        &self.cache
    }

    /// Parses a registration payload and records the replica.
    pub fn register(&self, info: &str) -> KvResult<Registration> {
        let replica: ReplicaIdentity = info.parse()?;
        Ok(self.directory.register(replica))
    }

    /// Runs one PUT or DEL through both phases.
    ///
    /// Returns `Ok` on COMMIT and `KvError::Aborted` carrying the first abort
    /// reason otherwise. Does not return until both replicas acknowledged
    /// the decision.
    pub async fn handle_tpc_request(&self, request: &KvMessage) -> KvResult<()> {
        let key = match request {
            KvMessage::PutReq { key, .. } | KvMessage::DelReq { key } => key.clone(),
            _ => return Err(KvError::InvalidFormat),
        };

        self.directory.wait_for_quorum().await;
        let _txn = self.txn_lock.lock().await;

        let txn_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "txn",
            id = %txn_id,
            kind = %request.kind(),
            key = %key
        );
        self.run_transaction(&key, request).instrument(span).await
    }

    async fn run_transaction(&self, key: &str, request: &KvMessage) -> KvResult<()> {
        let (primary, backup) = self
            .directory
            .owners(key)
            .ok_or(KvError::CouldNotConnect)?;
        tracing::debug!("Replicas: primary #{} backup #{}", primary.id, backup.id);

        // Phase 1
        let (first, second) = tokio::join!(
            self.prepare(&primary, request),
            self.prepare(&backup, request)
        );
        let votes = [first, second];
        let decision = TransactionDecision::from_votes(&votes);
        tracing::info!("Decision: {}", decision);

        // Phase 2
        tokio::join!(
            self.deliver(&primary, decision),
            self.deliver(&backup, decision)
        );

        match decision {
            TransactionDecision::Commit => {
                let mut set = self.cache.lock_for(key).await;
                match request {
                    KvMessage::PutReq { key, value } => set.put(key, value),
                    _ => set.del(key),
                }
                Ok(())
            }
            TransactionDecision::Abort => {
                let reason = votes
                    .iter()
                    .find_map(Vote::reason)
                    .map(|reason| reason.to_string())
                    .unwrap_or_default();
                Err(KvError::Aborted(reason))
            }
        }
    }

    /// Sends the request once. Anything but READY within the timeout is an
    /// abort vote.
    async fn prepare(&self, replica: &ReplicaIdentity, request: &KvMessage) -> Vote {
        let reply = self
            .transport
            .call(&replica.hostname, replica.port, request, self.timeout)
            .await;
        let vote = Vote::from_reply(reply);
        match &vote {
            Vote::Abort(reason) if reason.is_transport() => {
                tracing::warn!(
                    "Replica #{} unreachable in phase 1, counted as abort: {}",
                    replica.id,
                    reason
                );
            }
            Vote::Abort(reason) => {
                tracing::info!("Replica #{} voted abort: {}", replica.id, reason);
            }
            Vote::Ready => {}
        }
        vote
    }

    /// Sends the decision until the replica acknowledges it. There is no
    /// retry limit; the replica's address is looked up again before every
    /// attempt in case it re-registered elsewhere.
    async fn deliver(&self, replica: &ReplicaIdentity, decision: TransactionDecision) {
        let message = decision.message();
        let mut target = replica.clone();
        let mut backoff = self.retry.backoff();
        let mut attempt = 1u64;

        loop {
            match self
                .transport
                .call(&target.hostname, target.port, &message, self.timeout)
                .await
            {
                Ok(KvMessage::Ack) => {
                    tracing::debug!("Replica #{} acknowledged {}", target.id, decision);
                    return;
                }
                Ok(other) => tracing::warn!(
                    "Replica #{} answered {} with {} (attempt {})",
                    target.id,
                    decision,
                    other.kind(),
                    attempt
                ),
                Err(e) => tracing::warn!(
                    "Delivering {} to replica #{} failed: {} (attempt {})",
                    decision,
                    target.id,
                    e,
                    attempt
                ),
            }

            tokio::time::sleep(backoff.next_delay()).await;
            attempt += 1;
            if let Some(current) = self.directory.get(target.id) {
                target = current;
            }
        }
    }

    /// Serves a read from the coordinator cache, falling back to the
    /// primary and then the backup replica.
    pub async fn handle_get(&self, key: &str) -> KvResult<String> {
        validate_key(key)?;

        self.directory.wait_for_quorum().await;
        let _txn = self.txn_lock.lock().await;

        let mut set = self.cache.lock_for(key).await;
        if let Some(value) = set.get(key) {
            tracing::trace!("Cache hit for '{}'", key);
            return Ok(value);
        }

        let primary = self
            .directory
            .find_first_replica(key)
            .ok_or(KvError::NoSuchKey)?;
        let mut value = self.fetch(&primary, key).await;
        if value.is_none() {
            if let Some(backup) = self.directory.find_successor(&primary) {
                value = self.fetch(&backup, key).await;
            }
        }

        match value {
            Some(value) => {
                set.put(key, &value);
                Ok(value)
            }
            None => Err(KvError::NoSuchKey),
        }
    }

    /// Best-effort single read from one replica.
    async fn fetch(&self, replica: &ReplicaIdentity, key: &str) -> Option<String> {
        let request = KvMessage::GetReq {
            key: key.to_string(),
        };
        match self
            .transport
            .call(&replica.hostname, replica.port, &request, self.timeout)
            .await
        {
            Ok(KvMessage::Resp {
                value: Some(value), ..
            }) => Some(value),
            Ok(reply) => {
                tracing::debug!(
                    "Replica #{} has no value for '{}': {:?}",
                    replica.id,
                    key,
                    reply
                );
                None
            }
            Err(e) => {
                tracing::debug!("GET '{}' from replica #{} failed: {}", key, replica.id, e);
                None
            }
        }
    }
}
