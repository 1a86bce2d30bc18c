use crate::error::KvError;
use crate::protocol::KvMessage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The cluster-wide outcome of one transaction. Computed once from the two
/// phase-1 votes and never revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionDecision {
    Commit,
    Abort,
}

impl TransactionDecision {
    /// COMMIT iff every vote is READY.
    pub fn from_votes(votes: &[Vote]) -> Self {
        if votes.iter().all(Vote::is_ready) {
            TransactionDecision::Commit
        } else {
            TransactionDecision::Abort
        }
    }

    /// The phase-2 message carrying this decision.
    pub fn message(self) -> KvMessage {
        match self {
            TransactionDecision::Commit => KvMessage::Commit,
            TransactionDecision::Abort => KvMessage::Abort { message: None },
        }
    }

    /// Recognises a logged or received phase-2 message.
    pub fn from_message(message: &KvMessage) -> Option<Self> {
        match message {
            KvMessage::Commit => Some(TransactionDecision::Commit),
            KvMessage::Abort { .. } => Some(TransactionDecision::Abort),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionDecision::Commit => f.write_str("COMMIT"),
            TransactionDecision::Abort => f.write_str("ABORT"),
        }
    }
}

/// One replica's phase-1 answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Ready,
    /// Explicit ABORT, an error reply, or a failed round trip. Timeouts land
    /// here too and are not treated any differently.
    Abort(KvError),
}

impl Vote {
    pub fn is_ready(&self) -> bool {
        matches!(self, Vote::Ready)
    }

    /// Interprets the outcome of a phase-1 round trip.
    pub fn from_reply(reply: Result<KvMessage, KvError>) -> Self {
        match reply {
            Ok(KvMessage::Ready) => Vote::Ready,
            Ok(KvMessage::Abort {
                message: Some(text),
            })
            | Ok(KvMessage::Resp {
                message: Some(text),
                ..
            }) => Vote::Abort(KvError::from_status(&text)),
            Ok(_) => Vote::Abort(KvError::InvalidFormat),
            Err(e) => Vote::Abort(e),
        }
    }

    pub fn reason(&self) -> Option<&KvError> {
        match self {
            Vote::Ready => None,
            Vote::Abort(reason) => Some(reason),
        }
    }
}
