use crate::error::KvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity and address of one storage replica.
///
/// Ids are unsigned on the ring but are often produced by hashing strings,
/// so the registration format accepts them in signed form as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaIdentity {
    pub id: u64,
    pub hostname: String,
    pub port: u16,
}

impl ReplicaIdentity {
    pub fn new(id: u64, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            port,
        }
    }

    /// `"<host>:<port>"`
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Formats as the registration payload `"<id>@<host>:<port>"`.
impl fmt::Display for ReplicaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id as i64, self.hostname, self.port)
    }
}

impl FromStr for ReplicaIdentity {
    type Err = KvError;

    fn from_str(info: &str) -> Result<Self, Self::Err> {
        let (id, address) = info.split_once('@').ok_or(KvError::InvalidFormat)?;
        let (hostname, port) = address.rsplit_once(':').ok_or(KvError::InvalidFormat)?;

        if hostname.is_empty() {
            return Err(KvError::InvalidFormat);
        }

        let id = parse_replica_id(id).ok_or(KvError::InvalidFormat)?;
        let port = port.parse::<u16>().map_err(|_| KvError::InvalidFormat)?;

        Ok(Self::new(id, hostname, port))
    }
}

/// Accepts an id as unsigned or as its signed 64-bit reinterpretation.
pub fn parse_replica_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<i64>().ok().map(|id| id as u64))
}
