//! Worker Pool Module
//!
//! A fixed set of workers draining one shared, unbounded FIFO job queue.
//! Every network-facing role (client traffic, replica traffic, registration)
//! owns its own `WorkerPool`, so a burst on one role never starves another.
//!
//! ## Semantics
//! - **Blocking dequeue**: an idle worker parks until a job is submitted.
//! - **One job per worker**: a worker runs its job to completion before it
//!   takes the next one, so a pool of `n` workers has at most `n` jobs in flight.
//! - **No priority, no backpressure, no cancellation**: jobs run in submission
//!   order as workers free up, and a submitted job always eventually runs.

pub mod worker;

pub use worker::{Job, WorkerPool};
