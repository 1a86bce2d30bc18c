//! Wire Protocol Module
//!
//! Defines the messages exchanged between clients, the coordinator and the
//! replicas, how they are framed on a TCP stream, and the request/response
//! transport the coordinator uses to reach replicas.
//!
//! ## Submodules
//! - **`message`**: the closed `KvMessage` union. Every handler matches on it
//!   exhaustively, so adding a kind is a compile-checked change.
//! - **`codec`**: length-prefixed bincode frames.
//! - **`transport`**: the `Transport` contract (one timed round trip per call)
//!   and its TCP implementation.

pub mod codec;
pub mod message;
pub mod transport;

pub use message::{KvMessage, MessageKind};
pub use transport::{TcpTransport, Transport};
