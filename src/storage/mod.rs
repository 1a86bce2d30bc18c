//! Storage Module
//!
//! The node-local storage stack every role sits on.
//!
//! ## Core Concepts
//! - **Store**: the durable backing layer. `MemoryStore` keeps data in a
//!   concurrent map and persists it by dumping to / restoring from a file.
//! - **Write-through**: `KvServer` layers an eviction cache over a store.
//!   Every mutation hits both layers inside one critical section (the key's
//!   cache-set lock), so no reader holding that lock can see them disagree.
//! - **Validation**: key and value sizes are checked before any mutation.

pub mod server;
pub mod store;

pub use server::{KvServer, MAX_KEY_SIZE, MAX_VALUE_SIZE, validate_key, validate_value};
pub use store::{MemoryStore, Store};
