use crate::error::{KvError, SUCCESS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every message that crosses a socket in this system.
///
/// Requests from clients and the coordinator carry their key (and value);
/// replies carry an optional status text. A `Resp` with a key and value is a
/// successful GET reply; a `Resp` with only a message is a status reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvMessage {
    GetReq {
        key: String,
    },
    PutReq {
        key: String,
        value: String,
    },
    DelReq {
        key: String,
    },
    Resp {
        key: Option<String>,
        value: Option<String>,
        message: Option<String>,
    },
    Ready,
    Abort {
        message: Option<String>,
    },
    Commit,
    Ack,
    /// Payload is `"<replicaID>@<hostname>:<port>"`.
    Register {
        info: String,
    },
}

/// Wire-level tag of a message, used for logging and dispatch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    GetReq,
    PutReq,
    DelReq,
    Resp,
    Ready,
    Abort,
    Commit,
    Ack,
    Register,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MessageKind::GetReq => "getreq",
            MessageKind::PutReq => "putreq",
            MessageKind::DelReq => "delreq",
            MessageKind::Resp => "resp",
            MessageKind::Ready => "ready",
            MessageKind::Abort => "abort",
            MessageKind::Commit => "commit",
            MessageKind::Ack => "ack",
            MessageKind::Register => "register",
        };
        f.write_str(tag)
    }
}

impl KvMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            KvMessage::GetReq { .. } => MessageKind::GetReq,
            KvMessage::PutReq { .. } => MessageKind::PutReq,
            KvMessage::DelReq { .. } => MessageKind::DelReq,
            KvMessage::Resp { .. } => MessageKind::Resp,
            KvMessage::Ready => MessageKind::Ready,
            KvMessage::Abort { .. } => MessageKind::Abort,
            KvMessage::Commit => MessageKind::Commit,
            KvMessage::Ack => MessageKind::Ack,
            KvMessage::Register { .. } => MessageKind::Register,
        }
    }

    /// The key a request or GET reply refers to.
    pub fn key(&self) -> Option<&str> {
        match self {
            KvMessage::GetReq { key } | KvMessage::PutReq { key, .. } | KvMessage::DelReq { key } => {
                Some(key)
            }
            KvMessage::Resp { key, .. } => key.as_deref(),
            KvMessage::Ready
            | KvMessage::Abort { .. }
            | KvMessage::Commit
            | KvMessage::Ack
            | KvMessage::Register { .. } => None,
        }
    }

    /// `Resp` carrying a status text only.
    pub fn status(text: impl Into<String>) -> Self {
        KvMessage::Resp {
            key: None,
            value: None,
            message: Some(text.into()),
        }
    }

    pub fn success() -> Self {
        Self::status(SUCCESS)
    }

    pub fn error(err: &KvError) -> Self {
        Self::status(err.to_string())
    }

    /// Successful GET reply.
    pub fn value(key: &str, value: String) -> Self {
        KvMessage::Resp {
            key: Some(key.to_string()),
            value: Some(value),
            message: None,
        }
    }

    pub fn abort(err: &KvError) -> Self {
        KvMessage::Abort {
            message: Some(err.to_string()),
        }
    }
}
