//! Cluster Integration Tests
//!
//! A coordinator and two replicas talking over real loopback sockets, driven
//! through the public client.

use replikv::config::{CoordinatorConfig, RetryPolicy};
use replikv::directory::ReplicaIdentity;
use replikv::error::KvError;
use replikv::network::{
    ClientHandler, KvClient, RegistrationHandler, ReplicaNetworkHandler, SocketServer,
    register_with_coordinator,
};
use replikv::protocol::codec::{read_message, write_message};
use replikv::protocol::{KvMessage, TcpTransport};
use replikv::storage::{KvServer, MemoryStore, Store};
use replikv::tpc::{Coordinator, ReplicaHandler};
use replikv::wal::TpcLog;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_millis(500);

struct TestCluster {
    coordinator: Arc<Coordinator<TcpTransport>>,
    client_addr: SocketAddr,
    registration_addr: SocketAddr,
    replicas: Vec<TestReplica>,
    _dir: TempDir,
}

struct TestReplica {
    id: u64,
    handler: Arc<ReplicaHandler>,
    task: JoinHandle<()>,
}

impl TestCluster {
    async fn start() -> Self {
        let config = CoordinatorConfig {
            num_replicas: 2,
            timeout: TIMEOUT,
            retry: RetryPolicy {
                initial_ms: 20,
                max_ms: 100,
                jitter_ms: 0,
            },
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(Coordinator::new(&config, TcpTransport::new()));

        let registration = SocketServer::bind("registration", "127.0.0.1:0").await.unwrap();
        let registration_addr = registration.local_addr().unwrap();
        registration.spawn(Arc::new(RegistrationHandler::new(
            coordinator.clone(),
            1,
            TIMEOUT,
        )));

        let clients = SocketServer::bind("client", "127.0.0.1:0").await.unwrap();
        let client_addr = clients.local_addr().unwrap();
        clients.spawn(Arc::new(ClientHandler::new(coordinator.clone(), 4, TIMEOUT)));

        let dir = tempfile::tempdir().unwrap();
        let mut replicas = Vec::new();
        for (name, id) in [("a", 1_000u64), ("b", u64::MAX - 1_000)] {
            let handler = replica_handler(dir.path(), name);
            let task = serve_replica(&handler, id, registration_addr).await;
            replicas.push(TestReplica { id, handler, task });
        }

        Self {
            coordinator,
            client_addr,
            registration_addr,
            replicas,
            _dir: dir,
        }
    }

    fn client(&self, timeout: Duration) -> KvClient {
        KvClient::new("127.0.0.1", self.client_addr.port(), timeout)
    }

    fn stored(&self, replica: usize, key: &str) -> Option<String> {
        self.replicas[replica].handler.server().store().get(key)
    }
}

fn replica_handler(dir: &Path, name: &str) -> Arc<ReplicaHandler> {
    let server = KvServer::new(4, 4, Arc::new(MemoryStore::new()));
    let wal = TpcLog::open(dir.join(format!("{}.wal", name))).unwrap();
    Arc::new(ReplicaHandler::new(server, wal))
}

/// Listens on a fresh port and (re-)registers `id` there.
async fn serve_replica(
    handler: &Arc<ReplicaHandler>,
    id: u64,
    registration: SocketAddr,
) -> JoinHandle<()> {
    let listener = SocketServer::bind("replica", "127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = listener.spawn(Arc::new(ReplicaNetworkHandler::new(
        handler.clone(),
        2,
        TIMEOUT,
    )));

    register_with_coordinator(
        &TcpTransport::new(),
        "127.0.0.1",
        registration.port(),
        &ReplicaIdentity::new(id, "127.0.0.1", port),
        TIMEOUT,
    )
    .await
    .unwrap();
    task
}

/// Like `serve_replica`, but PUT/DEL requests are read and never answered.
async fn serve_stalling_replica(
    handler: &Arc<ReplicaHandler>,
    id: u64,
    registration: SocketAddr,
) -> JoinHandle<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handler = handler.clone();
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let Ok(request) = read_message(&mut stream).await else {
                    return;
                };
                if matches!(request, KvMessage::PutReq { .. } | KvMessage::DelReq { .. }) {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    return;
                }
                let reply = handler.handle(&request).await;
                let _ = write_message(&mut stream, &reply).await;
            });
        }
    });

    register_with_coordinator(
        &TcpTransport::new(),
        "127.0.0.1",
        registration.port(),
        &ReplicaIdentity::new(id, "127.0.0.1", port),
        TIMEOUT,
    )
    .await
    .unwrap();
    task
}

#[tokio::test]
async fn test_put_get_del_through_coordinator() {
    let cluster = TestCluster::start().await;
    assert!(cluster.coordinator.directory().quorum().is_open());
    let client = cluster.client(Duration::from_secs(5));

    client.put("foo", "bar").await.unwrap();
    assert_eq!(client.get("foo").await.unwrap(), "bar");
    assert_eq!(cluster.stored(0, "foo"), Some("bar".to_string()));
    assert_eq!(cluster.stored(1, "foo"), Some("bar".to_string()));

    client.put("foo", "baz").await.unwrap();
    assert_eq!(client.get("foo").await.unwrap(), "baz");

    client.del("foo").await.unwrap();
    assert_eq!(client.get("foo").await, Err(KvError::NoSuchKey));
    assert_eq!(cluster.stored(0, "foo"), None);
    assert_eq!(cluster.stored(1, "foo"), None);
}

#[tokio::test]
async fn test_replica_validation_reaches_client() {
    let cluster = TestCluster::start().await;
    let client = cluster.client(Duration::from_secs(5));

    let oversized = "v".repeat(256 * 1024 + 1);
    assert_eq!(
        client.put("foo", &oversized).await,
        Err(KvError::OversizedValue)
    );
    assert_eq!(client.del("never-written").await, Err(KvError::NoSuchKey));
    assert_eq!(cluster.stored(0, "foo"), None);
    assert_eq!(cluster.stored(1, "foo"), None);
}

#[tokio::test]
async fn test_concurrent_clients_are_serialized() {
    let cluster = TestCluster::start().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = cluster.client(Duration::from_secs(10));
        tasks.push(tokio::spawn(async move {
            client.put(&format!("k{}", i), &format!("v{}", i)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for i in 0..8 {
        let key = format!("k{}", i);
        let expected = Some(format!("v{}", i));
        assert_eq!(cluster.stored(0, &key), expected);
        assert_eq!(cluster.stored(1, &key), expected);
    }
}

#[tokio::test]
async fn test_outage_aborts_and_waits_for_reregistration() {
    let mut cluster = TestCluster::start().await;
    let client = cluster.client(Duration::from_secs(10));
    client.put("foo", "old").await.unwrap();

    // Take replica b down.
    let down = cluster.replicas.pop().unwrap();
    down.task.abort();
    let _ = down.task.await;

    let pending = {
        let client = cluster.client(Duration::from_secs(10));
        tokio::spawn(async move { client.put("foo", "new").await })
    };

    // Phase 2 keeps retrying the unreachable replica.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!pending.is_finished());

    // Same id, new port.
    let _task = serve_replica(&down.handler, down.id, cluster.registration_addr).await;

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("transaction did not finish after re-registration")
        .unwrap();
    assert_eq!(result, Err(KvError::CouldNotConnect));

    assert_eq!(client.get("foo").await.unwrap(), "old");
    assert_eq!(cluster.stored(0, "foo"), Some("old".to_string()));
    assert_eq!(
        down.handler.server().store().get("foo"),
        Some("old".to_string())
    );
}

#[tokio::test]
async fn test_lost_prepare_reply_reaches_client_as_abort() {
    let mut cluster = TestCluster::start().await;
    // Outlasts a phase-1 timeout plus a phase-2 round trip and backoff.
    let client = cluster.client(2 * TIMEOUT + Duration::from_millis(500));
    client.put("foo", "old").await.unwrap();

    let slow = cluster.replicas.pop().unwrap();
    slow.task.abort();
    let _ = slow.task.await;
    let _task = serve_stalling_replica(&slow.handler, slow.id, cluster.registration_addr).await;

    let started = Instant::now();
    let result = client.put("foo", "new").await;

    // The coordinator answered with the vote's reason before the client gave up.
    assert_eq!(result, Err(KvError::SocketTimeout));
    assert!(started.elapsed() < 2 * TIMEOUT + Duration::from_millis(400));

    assert_eq!(client.get("foo").await.unwrap(), "old");
    assert_eq!(cluster.stored(0, "foo"), Some("old".to_string()));
    assert_eq!(slow.handler.server().store().get("foo"), Some("old".to_string()));
}
