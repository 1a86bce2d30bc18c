use crate::error::KvError;
use crate::protocol::KvMessage;
use crate::protocol::codec::{read_message, write_message};
use crate::protocol::transport::TcpTransport;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Receives accepted connections. Implementations hand the stream to their
/// own worker pool and return immediately so the accept loop never stalls.
pub trait NetworkHandler: Send + Sync + 'static {
    fn handle(&self, stream: TcpStream);
}

/// A bound listener feeding one `NetworkHandler`.
pub struct SocketServer {
    name: String,
    listener: TcpListener,
}

impl SocketServer {
    pub async fn bind(name: &str, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {} listener on {}", name, addr))?;
        Ok(Self {
            name: name.to_string(),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever.
    pub async fn serve<H: NetworkHandler>(self, handler: Arc<H>) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("{} listener accepting on {}", self.name, addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::trace!("{} connection from {}", self.name, peer);
                    handler.handle(stream);
                }
                Err(e) => {
                    tracing::error!("{} listener failed to accept: {}", self.name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub fn spawn<H: NetworkHandler>(self, handler: Arc<H>) -> JoinHandle<()> {
        tokio::spawn(self.serve(handler))
    }
}

/// Reads one request, answers it, and closes the connection.
///
/// A request that cannot be read within `read_timeout` or cannot be decoded
/// gets a status reply describing why. Delivery of any reply is best-effort.
pub async fn serve_connection<F, Fut>(mut stream: TcpStream, read_timeout: Duration, respond: F)
where
    F: FnOnce(KvMessage) -> Fut,
    Fut: Future<Output = KvMessage>,
{
    let request = match tokio::time::timeout(read_timeout, read_message(&mut stream)).await {
        Ok(result) => result,
        Err(_) => Err(KvError::CouldNotReceiveData),
    };

    let reply = match request {
        Ok(request) => respond(request).await,
        Err(e) => {
            tracing::debug!("Unreadable request: {}", e);
            KvMessage::error(&e)
        }
    };

    if let Err(e) = write_message(&mut stream, &reply).await {
        tracing::debug!("Could not deliver {} reply: {}", reply.kind(), e);
    }
    TcpTransport::close(stream).await;
}
