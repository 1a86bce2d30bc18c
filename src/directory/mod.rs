//! Replica Directory Module
//!
//! Tracks the fixed set of replicas the coordinator writes to and decides
//! which two of them own a key.
//!
//! ## Core Concepts
//! - **Registration**: replicas announce themselves as `"<id>@<host>:<port>"`.
//!   The directory holds at most `capacity` ids; a known id may re-register
//!   at a new address, an unknown id arriving once full is dropped.
//! - **Ring**: keys and replica ids share one unsigned 64-bit space. A key's
//!   primary is the first id at or after its hash, wrapping to the smallest
//!   id; the backup is the primary's successor under the same rule.
//! - **Quorum latch**: a one-shot gate that opens when the directory first
//!   reaches capacity and never closes again.

pub mod barrier;
pub mod ring;
pub mod types;

pub use barrier::QuorumLatch;
pub use ring::{Registration, ReplicaDirectory, hash_to_64bit};
pub use types::ReplicaIdentity;

#[cfg(test)]
mod tests;
