//! Two-Phase Commit Module
//!
//! Keeps the two replicas that own a key in agreement on every write.
//!
//! ## Flow
//! 1. **Quorum**: the coordinator waits until every expected replica has
//!    registered. Once satisfied this never blocks again.
//! 2. **Prepare**: the request goes to the key's primary and its successor,
//!    each under its own timeout. READY is a commit vote; an ABORT, an error
//!    reply or a timeout is an abort vote.
//! 3. **Decide**: COMMIT iff both voted READY. Final once computed.
//! 4. **Deliver**: the decision is resent to each replica until it answers
//!    ACK, with no retry limit. An unreachable replica stalls the
//!    transaction until it comes back.
//! 5. **Cache**: on COMMIT the coordinator applies the write to its own
//!    cache under the key's set lock. ABORT leaves the cache alone.
//!
//! Only one transaction or read runs at a time across the whole cluster.

pub mod coordinator;
pub mod participant;
pub mod types;

pub use coordinator::Coordinator;
pub use participant::{RecoveryReport, ReplicaHandler};
pub use types::{TransactionDecision, Vote};
