use super::types::TransactionDecision;
use crate::error::{KvError, KvResult};
use crate::protocol::KvMessage;
use crate::storage::{KvServer, validate_key, validate_value};
use crate::wal::TpcLog;
use std::path::Path;

/// What startup recovery did with the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Committed transactions re-applied to storage.
    pub redone: usize,
    /// Latest request with no decision logged after it. The coordinator's
    /// phase-2 retry settles it.
    pub in_doubt: Option<KvMessage>,
}

/// Participant side of 2PC on one replica.
///
/// Phase 1 only validates. The mutation happens on COMMIT, using the most
/// recent request in the log. Every transaction message is logged before
/// its reply is returned.
pub struct ReplicaHandler {
    server: KvServer,
    wal: TpcLog,
}

impl ReplicaHandler {
    pub fn new(server: KvServer, wal: TpcLog) -> Self {
        Self { server, wal }
    }

    pub fn server(&self) -> &KvServer {
        &self.server
    }

    pub fn wal(&self) -> &TpcLog {
        &self.wal
    }

    /// Computes the reply to one inbound message.
    pub async fn handle(&self, request: &KvMessage) -> KvMessage {
        match request {
            KvMessage::GetReq { key } => {
                let reply = match self.server.get(key).await {
                    Ok(value) => KvMessage::value(key, value),
                    Err(e) => KvMessage::error(&e),
                };
                self.logged(request, reply, KvMessage::error)
            }
            KvMessage::PutReq { key, value } => {
                let vote = validate_key(key).and_then(|_| validate_value(value));
                self.logged(request, vote_reply(vote), KvMessage::abort)
            }
            KvMessage::DelReq { key } => {
                let vote = match validate_key(key) {
                    Ok(()) => {
                        if self.server.has_key(key).await {
                            Ok(())
                        } else {
                            Err(KvError::NoSuchKey)
                        }
                    }
                    Err(e) => Err(e),
                };
                self.logged(request, vote_reply(vote), KvMessage::abort)
            }
            KvMessage::Commit => {
                // Logged before applying so a crash in between is redone.
                if let Err(e) = self.wal.append_and_flush(request) {
                    return KvMessage::error(&e);
                }
                self.apply_current().await
            }
            KvMessage::Abort { .. } => self.logged(request, KvMessage::Ack, KvMessage::error),
            KvMessage::Resp { .. }
            | KvMessage::Ready
            | KvMessage::Ack
            | KvMessage::Register { .. } => {
                tracing::warn!("Replica got unexpected {} message", request.kind());
                KvMessage::error(&KvError::InvalidFormat)
            }
        }
    }

    /// Returns `reply` once `request` is durable, or the log failure
    /// rendered by `on_failure`.
    fn logged(
        &self,
        request: &KvMessage,
        reply: KvMessage,
        on_failure: fn(&KvError) -> KvMessage,
    ) -> KvMessage {
        match self.wal.append_and_flush(request) {
            Ok(_) => reply,
            Err(e) => on_failure(&e),
        }
    }

    async fn apply_current(&self) -> KvMessage {
        let Some(current) = self.wal.last_transaction() else {
            tracing::warn!("COMMIT with no logged request, nothing to apply");
            return KvMessage::Ack;
        };
        if current.decision != Some(TransactionDecision::Commit) {
            tracing::warn!(
                "COMMIT for {} at seq {} that was already aborted, not applying",
                current.request.kind(),
                current.seq
            );
            return KvMessage::Ack;
        }

        match self.apply(&current.request).await {
            Ok(()) => {
                tracing::debug!(
                    "Applied {} for '{}'",
                    current.request.kind(),
                    key_of(&current.request)
                );
                KvMessage::Ack
            }
            Err(e) => {
                tracing::error!("Failed to apply committed {}: {}", current.request.kind(), e);
                KvMessage::error(&e)
            }
        }
    }

    async fn apply(&self, request: &KvMessage) -> KvResult<()> {
        match request {
            KvMessage::PutReq { key, value } => self.server.put(key, value).await,
            KvMessage::DelReq { key } => self.server.del(key).await,
            _ => Ok(()),
        }
    }

    /// Redoes every transaction the log shows as committed, oldest first.
    ///
    /// Run once at startup after the store snapshot was restored. The
    /// snapshot may predate some of those writes; replaying them in order
    /// over it yields the latest committed state.
    pub async fn recover(&self) -> KvResult<RecoveryReport> {
        let transactions = self.wal.transactions()?;
        let mut report = RecoveryReport::default();

        for txn in &transactions {
            if txn.decision == Some(TransactionDecision::Commit) {
                self.apply(&txn.request).await?;
                report.redone += 1;
            }
        }

        if let Some(last) = transactions.last() {
            if last.decision.is_none() {
                tracing::warn!(
                    "Transaction {} on '{}' is in doubt, waiting for the coordinator",
                    last.request.kind(),
                    key_of(&last.request)
                );
                report.in_doubt = Some(last.request.clone());
            }
        }

        tracing::info!("Recovery redid {} committed transactions", report.redone);
        Ok(report)
    }

    /// Dumps the store to `store_path`, then drops log records the dump
    /// already covers. Returns how many records were dropped.
    pub fn checkpoint(&self, store_path: &Path) -> anyhow::Result<usize> {
        let mark = self.wal.next_seq();
        self.server.store().dump_to_file(store_path)?;
        let dropped = self.wal.compact(mark)?;
        tracing::debug!(
            "Checkpoint to {} dropped {} log records",
            store_path.display(),
            dropped
        );
        Ok(dropped)
    }
}

fn vote_reply(vote: KvResult<()>) -> KvMessage {
    match vote {
        Ok(()) => KvMessage::Ready,
        Err(e) => {
            if e.is_validation() {
                tracing::debug!("Rejecting request: {}", e);
            } else {
                tracing::info!("Voting abort: {}", e);
            }
            KvMessage::abort(&e)
        }
    }
}

fn key_of(request: &KvMessage) -> &str {
    request.key().unwrap_or_default()
}
