use super::codec::{read_message, write_message};
use super::message::KvMessage;
use crate::error::{KvError, KvResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// One request/response round trip to a remote endpoint.
///
/// Each call connects, sends `request`, waits for one reply and closes. The
/// whole round trip, connect included, is bounded by `timeout`; running out
/// of time yields `KvError::SocketTimeout`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(
        &self,
        host: &str,
        port: u16,
        request: &KvMessage,
        timeout: Duration,
    ) -> KvResult<KvMessage>;
}

/// Plain TCP transport, one connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Resolves and connects before `deadline`.
    pub async fn connect(host: &str, port: u16, deadline: Instant) -> KvResult<TcpStream> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| {
                tracing::debug!("Could not resolve {}:{}: {}", host, port, e);
                KvError::CouldNotCreateSocket
            })?
            .collect();

        if addrs.is_empty() {
            return Err(KvError::CouldNotCreateSocket);
        }

        match tokio::time::timeout_at(deadline, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                tracing::debug!("Could not connect to {}:{}: {}", host, port, e);
                Err(KvError::CouldNotConnect)
            }
            Err(_) => Err(KvError::SocketTimeout),
        }
    }

    /// One round trip that must finish before `deadline`.
    pub async fn call_by(
        host: &str,
        port: u16,
        request: &KvMessage,
        deadline: Instant,
    ) -> KvResult<KvMessage> {
        let mut stream = Self::connect(host, port, deadline).await?;

        let exchange = async {
            write_message(&mut stream, request).await?;
            read_message(&mut stream).await
        };
        let reply = match tokio::time::timeout_at(deadline, exchange).await {
            Ok(reply) => reply,
            Err(_) => Err(KvError::SocketTimeout),
        };

        Self::close(stream).await;
        reply
    }

    /// Best-effort close; the reply has already been read.
    pub async fn close(mut stream: TcpStream) {
        let _ = stream.shutdown().await;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(
        &self,
        host: &str,
        port: u16,
        request: &KvMessage,
        timeout: Duration,
    ) -> KvResult<KvMessage> {
        Self::call_by(host, port, request, Instant::now() + timeout).await
    }
}
