use super::handlers::registration_ack;
use crate::config::RetryPolicy;
use crate::directory::ReplicaIdentity;
use crate::error::{KvError, KvResult, SUCCESS};
use crate::protocol::{KvMessage, TcpTransport, Transport};
use std::time::Duration;

/// Request/response client for a coordinator or a standalone server.
///
/// Each call opens its own connection. Against a coordinator, `timeout`
/// must cover a whole aborting transaction (see
/// `config::DEFAULT_CLIENT_TIMEOUT_MS`), or the client gives up before the
/// abort reason arrives.
pub struct KvClient {
    host: String,
    port: u16,
    timeout: Duration,
    transport: TcpTransport,
}

impl KvClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            transport: TcpTransport::new(),
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        if key.is_empty() {
            return Err(KvError::InvalidKey);
        }
        if value.is_empty() {
            return Err(KvError::InvalidValue);
        }

        let reply = self
            .send(KvMessage::PutReq {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?;
        expect_success(reply)
    }

    pub async fn get(&self, key: &str) -> KvResult<String> {
        if key.is_empty() {
            return Err(KvError::InvalidKey);
        }

        match self
            .send(KvMessage::GetReq {
                key: key.to_string(),
            })
            .await?
        {
            KvMessage::Resp {
                value: Some(value), ..
            } => Ok(value),
            KvMessage::Resp {
                message: Some(text),
                ..
            } => Err(KvError::from_status(&text)),
            _ => Err(KvError::InvalidFormat),
        }
    }

    pub async fn del(&self, key: &str) -> KvResult<()> {
        if key.is_empty() {
            return Err(KvError::InvalidKey);
        }

        let reply = self
            .send(KvMessage::DelReq {
                key: key.to_string(),
            })
            .await?;
        expect_success(reply)
    }

    async fn send(&self, request: KvMessage) -> KvResult<KvMessage> {
        self.transport
            .call(&self.host, self.port, &request, self.timeout)
            .await
    }
}

fn expect_success(reply: KvMessage) -> KvResult<()> {
    match reply {
        KvMessage::Resp {
            message: Some(text),
            ..
        } if text == SUCCESS => Ok(()),
        KvMessage::Resp {
            message: Some(text),
            ..
        } => Err(KvError::from_status(&text)),
        _ => Err(KvError::InvalidFormat),
    }
}

/// Announces `replica` to the coordinator's registration endpoint once.
///
/// Only the exact acknowledgement text counts as success.
pub async fn register_with_coordinator<T: Transport>(
    transport: &T,
    host: &str,
    port: u16,
    replica: &ReplicaIdentity,
    timeout: Duration,
) -> KvResult<()> {
    let info = replica.to_string();
    let reply = transport
        .call(host, port, &KvMessage::Register { info: info.clone() }, timeout)
        .await?;

    match reply {
        KvMessage::Resp {
            message: Some(text),
            ..
        } if text == registration_ack(&info) => Ok(()),
        other => {
            tracing::warn!("Unexpected registration reply: {:?}", other);
            Err(KvError::InvalidFormat)
        }
    }
}

/// Keeps registering until the coordinator acknowledges.
pub async fn register_until_accepted<T: Transport>(
    transport: &T,
    host: &str,
    port: u16,
    replica: &ReplicaIdentity,
    timeout: Duration,
    retry: RetryPolicy,
) {
    let mut backoff = retry.backoff();
    loop {
        match register_with_coordinator(transport, host, port, replica, timeout).await {
            Ok(()) => {
                tracing::info!("Registered as {} with {}:{}", replica, host, port);
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    "Registration with {}:{} failed: {}, retrying in {:?}",
                    host,
                    port,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
