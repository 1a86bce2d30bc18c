//! Replicated Key-Value Store Library
//!
//! A small, statically sized cluster: one coordinator and a fixed set of
//! storage replicas kept in agreement with two-phase commit. This crate holds
//! every piece the binary (`main.rs`) wires together.
//!
//! ## Architecture Modules
//! - **`pool`**: fixed-size worker pools draining a FIFO job queue. Every
//!   network role runs on its own pool.
//! - **`cache`**: set-associative CLOCK cache with one lock per set. The set
//!   lock is what serializes operations on a key.
//! - **`storage`**: the durable store contract, an in-memory store with file
//!   snapshots, and the write-through server combining it with a cache.
//! - **`wal`**: the per-replica write-ahead log of transaction messages.
//! - **`directory`**: replica registration, the consistent-hash ring, and the
//!   quorum latch.
//! - **`protocol`**: wire messages, framing, and the request/response transport.
//! - **`tpc`**: the 2PC coordinator and the replica-side participant.
//! - **`network`**: listeners, per-role handlers, and the client.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod pool;
pub mod protocol;
pub mod storage;
pub mod tpc;
pub mod wal;
