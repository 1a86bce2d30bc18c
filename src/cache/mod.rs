//! Eviction Cache Module
//!
//! A set-associative, bounded cache with second-chance (CLOCK) replacement.
//!
//! ## Core Concepts
//! - **Sets**: a key lives in set `hash(key) mod num_sets`; each set holds at
//!   most `max_elems_per_set` entries.
//! - **Reference bit**: set on every hit and on every overwrite; new entries
//!   start cold.
//! - **Eviction**: inserting into a full set walks it from the front, clearing
//!   hot bits, and replaces the first cold entry in place.
//! - **Locking**: one async mutex per set. The only way to reach a set is
//!   through its guard, so callers cannot touch a set without holding its lock.

pub mod set;

pub use set::{CacheEntry, CacheSet, KvCache};
