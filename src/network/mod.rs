//! Network Module
//!
//! Sockets for every role. Each listener feeds one handler, and each handler
//! owns its own `WorkerPool`, so client traffic, registration traffic and
//! coordinator-to-replica traffic never compete for workers.
//!
//! ## Connection Model
//! One request per connection: read a frame, compute the reply, write it,
//! close. A reply that cannot be delivered is dropped; the server side never
//! leaves a connection hanging.

pub mod client;
pub mod handlers;
pub mod server;

pub use client::{KvClient, register_until_accepted, register_with_coordinator};
pub use handlers::{ClientHandler, RegistrationHandler, ReplicaNetworkHandler, ServerClientHandler};
pub use server::{NetworkHandler, SocketServer, serve_connection};
