use super::server::{NetworkHandler, serve_connection};
use crate::error::KvError;
use crate::pool::WorkerPool;
use crate::protocol::{KvMessage, Transport};
use crate::storage::KvServer;
use crate::tpc::{Coordinator, ReplicaHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

// ============================================================
// COORDINATOR: CLIENT TRAFFIC
// ============================================================

/// Client-facing side of the coordinator.
pub struct ClientHandler<T: Transport> {
    coordinator: Arc<Coordinator<T>>,
    pool: WorkerPool,
    read_timeout: Duration,
}

impl<T: Transport> ClientHandler<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>, workers: usize, read_timeout: Duration) -> Self {
        Self {
            coordinator,
            pool: WorkerPool::new("client", workers),
            read_timeout,
        }
    }
}

impl<T: Transport> NetworkHandler for ClientHandler<T> {
    fn handle(&self, stream: TcpStream) {
        let coordinator = self.coordinator.clone();
        self.pool.submit(serve_connection(
            stream,
            self.read_timeout,
            move |request| async move { client_reply(&coordinator, request).await },
        ));
    }
}

/// GET goes to `handle_get`, PUT and DEL through 2PC.
pub async fn client_reply<T: Transport>(
    coordinator: &Coordinator<T>,
    request: KvMessage,
) -> KvMessage {
    match &request {
        KvMessage::GetReq { key } => match coordinator.handle_get(key).await {
            Ok(value) => KvMessage::value(key, value),
            Err(e) => KvMessage::error(&e),
        },
        KvMessage::PutReq { .. } | KvMessage::DelReq { .. } => {
            match coordinator.handle_tpc_request(&request).await {
                Ok(()) => KvMessage::success(),
                Err(e) => KvMessage::error(&e),
            }
        }
        KvMessage::Resp { .. }
        | KvMessage::Ready
        | KvMessage::Abort { .. }
        | KvMessage::Commit
        | KvMessage::Ack
        | KvMessage::Register { .. } => KvMessage::error(&KvError::InvalidFormat),
    }
}

// ============================================================
// COORDINATOR: REGISTRATION TRAFFIC
// ============================================================

pub struct RegistrationHandler<T: Transport> {
    coordinator: Arc<Coordinator<T>>,
    pool: WorkerPool,
    read_timeout: Duration,
}

impl<T: Transport> RegistrationHandler<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>, workers: usize, read_timeout: Duration) -> Self {
        Self {
            coordinator,
            pool: WorkerPool::new("registration", workers),
            read_timeout,
        }
    }
}

impl<T: Transport> NetworkHandler for RegistrationHandler<T> {
    fn handle(&self, stream: TcpStream) {
        let coordinator = self.coordinator.clone();
        self.pool.submit(serve_connection(
            stream,
            self.read_timeout,
            move |request| async move { registration_reply(&coordinator, request) },
        ));
    }
}

/// Reply text a replica expects back from a successful registration.
pub fn registration_ack(info: &str) -> String {
    format!("Successfully registered {}", info)
}

pub fn registration_reply<T: Transport>(
    coordinator: &Coordinator<T>,
    request: KvMessage,
) -> KvMessage {
    match request {
        // A full directory drops unknown ids without telling the replica.
        KvMessage::Register { info } => match coordinator.register(&info) {
            Ok(_) => KvMessage::status(registration_ack(&info)),
            Err(e) => {
                tracing::warn!("Rejected registration '{}': {}", info, e);
                KvMessage::error(&e)
            }
        },
        other => {
            tracing::warn!("Registration endpoint got {} message", other.kind());
            KvMessage::error(&KvError::InvalidFormat)
        }
    }
}

// ============================================================
// REPLICA: COORDINATOR TRAFFIC
// ============================================================

/// Feeds coordinator messages to a replica's transaction handler.
pub struct ReplicaNetworkHandler {
    replica: Arc<ReplicaHandler>,
    pool: WorkerPool,
    read_timeout: Duration,
}

impl ReplicaNetworkHandler {
    pub fn new(replica: Arc<ReplicaHandler>, workers: usize, read_timeout: Duration) -> Self {
        Self {
            replica,
            pool: WorkerPool::new("replica", workers),
            read_timeout,
        }
    }
}

impl NetworkHandler for ReplicaNetworkHandler {
    fn handle(&self, stream: TcpStream) {
        let replica = self.replica.clone();
        self.pool.submit(serve_connection(
            stream,
            self.read_timeout,
            move |request| async move { replica.handle(&request).await },
        ));
    }
}

// ============================================================
// STANDALONE SERVER
// ============================================================

/// Serves clients directly from a write-through server, no replication.
pub struct ServerClientHandler {
    server: Arc<KvServer>,
    pool: WorkerPool,
    read_timeout: Duration,
}

impl ServerClientHandler {
    pub fn new(server: Arc<KvServer>, workers: usize, read_timeout: Duration) -> Self {
        Self {
            server,
            pool: WorkerPool::new("server", workers),
            read_timeout,
        }
    }
}

impl NetworkHandler for ServerClientHandler {
    fn handle(&self, stream: TcpStream) {
        let server = self.server.clone();
        self.pool.submit(serve_connection(
            stream,
            self.read_timeout,
            move |request| async move { server_reply(&server, request).await },
        ));
    }
}

pub async fn server_reply(server: &KvServer, request: KvMessage) -> KvMessage {
    let result = match &request {
        KvMessage::GetReq { key } => {
            return match server.get(key).await {
                Ok(value) => KvMessage::value(key, value),
                Err(e) => KvMessage::error(&e),
            };
        }
        KvMessage::PutReq { key, value } => server.put(key, value).await,
        KvMessage::DelReq { key } => server.del(key).await,
        _ => Err(KvError::InvalidFormat),
    };

    match result {
        Ok(()) => KvMessage::success(),
        Err(e) => KvMessage::error(&e),
    }
}
