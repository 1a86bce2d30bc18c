//! Write-Ahead Log Module
//!
//! Each replica appends every inbound transaction message to its own log
//! before replying, so a reply the coordinator has seen is always backed by
//! a durable record.
//!
//! ## Recovery Contract
//! - The latest PUT/DEL request is the transaction whose outcome may not yet
//!   be reflected in local storage.
//! - COMMIT and ABORT are logged as well, so the decision for that request is
//!   durable too. A request followed by a logged COMMIT can be redone without
//!   asking the coordinator; a request with no decision after it is in doubt
//!   until the coordinator's phase-2 retry arrives.
//! - Redo is safe because storage mutations are idempotent (PUT overwrites,
//!   DEL of an absent key is a no-op).

pub mod log;

pub use log::{LoggedTransaction, TpcLog, WalRecord, group_transactions};

#[cfg(test)]
mod tests;
