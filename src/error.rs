//! Error taxonomy shared by every role.
//!
//! The `Display` text of each variant is the exact status string carried in
//! `RESP` and `ABORT` messages, so an error raised on a replica can travel to
//! the coordinator and on to the client without a translation table.

use thiserror::Error;

pub const SUCCESS: &str = "Success";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KvError {
    // --- Validation ---
    #[error("Data Error: Oversized key")]
    OversizedKey,
    #[error("Data Error: Oversized value")]
    OversizedValue,
    #[error("Data Error: Invalid key")]
    InvalidKey,
    #[error("Data Error: Invalid value")]
    InvalidValue,

    // --- Lookup ---
    #[error("Data Error: Key does not exist")]
    NoSuchKey,

    // --- Transport ---
    #[error("Network Error: Socket timeout")]
    SocketTimeout,
    #[error("Network Error: Could not connect")]
    CouldNotConnect,
    #[error("Network Error: Could not create socket")]
    CouldNotCreateSocket,
    #[error("Network Error: Could not receive data")]
    CouldNotReceiveData,

    // --- Protocol ---
    #[error("Unknown Error: Invalid format")]
    InvalidFormat,

    /// A 2PC transaction was aborted; carries the first abort reason.
    #[error("{0}")]
    Aborted(String),

    /// WAL or store I/O failure.
    #[error("Storage Error: {0}")]
    Storage(String),

    /// Status text received from a peer that matches no known variant.
    #[error("{0}")]
    Remote(String),
}

impl KvError {
    /// Maps a status text received on the wire back to an error.
    pub fn from_status(text: &str) -> Self {
        [
            KvError::OversizedKey,
            KvError::OversizedValue,
            KvError::InvalidKey,
            KvError::InvalidValue,
            KvError::NoSuchKey,
            KvError::SocketTimeout,
            KvError::CouldNotConnect,
            KvError::CouldNotCreateSocket,
            KvError::CouldNotReceiveData,
            KvError::InvalidFormat,
        ]
        .into_iter()
        .find(|candidate| candidate.to_string() == text)
        .unwrap_or_else(|| KvError::Remote(text.to_string()))
    }

    /// Raised before any mutation; becomes an ABORT vote on a replica.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KvError::OversizedKey
                | KvError::OversizedValue
                | KvError::InvalidKey
                | KvError::InvalidValue
        )
    }

    /// Connection failures and timeouts. Downgraded to an abort vote in
    /// phase 1, retried forever in phase 2.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KvError::SocketTimeout
                | KvError::CouldNotConnect
                | KvError::CouldNotCreateSocket
                | KvError::CouldNotReceiveData
        )
    }
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        KvError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Storage(e.to_string())
    }
}

pub type KvResult<T> = std::result::Result<T, KvError>;
