use anyhow::Result;
use clap::Parser;
use replikv::config::{
    Cli, ClientArgs, ClientOp, Command, CoordinatorArgs, ReplicaArgs, ServerArgs, split_address,
};
use replikv::error::SUCCESS;
use replikv::network::{
    ClientHandler, KvClient, RegistrationHandler, ReplicaNetworkHandler, ServerClientHandler,
    SocketServer, register_until_accepted,
};
use replikv::protocol::TcpTransport;
use replikv::storage::{KvServer, MemoryStore, Store};
use replikv::tpc::{Coordinator, ReplicaHandler};
use replikv::wal::TpcLog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Coordinator(args) => run_coordinator(args).await,
        Command::Replica(args) => run_replica(args).await,
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}

async fn run_coordinator(args: CoordinatorArgs) -> Result<()> {
    let config = args.to_config();

    // 1. Coordinator state:
    let coordinator = Arc::new(Coordinator::new(&config, TcpTransport::new()));

    // 2. Listeners:
    let registration = SocketServer::bind("registration", &args.registration_addr).await?;
    let clients = SocketServer::bind("client", &args.client_addr).await?;

    tracing::info!(
        "Coordinator waiting for {} replicas on {}, serving clients on {}",
        config.num_replicas,
        registration.local_addr()?,
        clients.local_addr()?
    );

    // 3. One worker pool per role:
    let registration_task = registration.spawn(Arc::new(RegistrationHandler::new(
        coordinator.clone(),
        config.workers,
        config.timeout,
    )));
    let client_task = clients.spawn(Arc::new(ClientHandler::new(
        coordinator,
        config.workers,
        config.timeout,
    )));

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        res = registration_task => anyhow::bail!("registration listener stopped: {:?}", res),
        res = client_task => anyhow::bail!("client listener stopped: {:?}", res),
    }
    Ok(())
}

async fn run_replica(args: ReplicaArgs) -> Result<()> {
    // 1. Bind first so the registered port is the real one:
    let listener = SocketServer::bind("replica", &args.listen).await?;
    let config = args.to_config(listener.local_addr()?.port())?;

    // 2. Storage, log, recovery:
    let store = Arc::new(MemoryStore::new());
    store.restore_from_file(&config.store_path)?;
    let server = KvServer::new(config.cache_sets, config.cache_set_size, store);
    let wal = TpcLog::open(&config.wal_path)?;
    let replica = Arc::new(ReplicaHandler::new(server, wal));

    let report = replica.recover().await?;
    if let Some(request) = &report.in_doubt {
        tracing::info!("Pending {} will be settled by the coordinator", request.kind());
    }

    // 3. Serve coordinator traffic:
    let serve_task = listener.spawn(Arc::new(ReplicaNetworkHandler::new(
        replica.clone(),
        config.workers,
        config.timeout,
    )));

    // 4. Periodic snapshot:
    {
        let replica = replica.clone();
        let path = config.store_path.clone();
        let every = config.dump_interval;
        tokio::spawn(async move {
            checkpoint_loop(&replica, path, every).await;
        });
    }

    // 5. Join the cluster:
    let (host, port) = split_address(&args.coordinator)?;
    register_until_accepted(
        &TcpTransport::new(),
        &host,
        port,
        &config.identity(),
        config.timeout,
        config.registration_retry,
    )
    .await;

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        res = serve_task => anyhow::bail!("replica listener stopped: {:?}", res),
    }

    replica.checkpoint(&config.store_path)?;
    Ok(())
}

async fn checkpoint_loop(replica: &ReplicaHandler, path: PathBuf, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick fires immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = replica.checkpoint(&path) {
            tracing::error!("Checkpoint to {} failed: {:#}", path.display(), e);
        }
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.restore_from_file(&args.store)?;
    let server = Arc::new(KvServer::new(
        args.cache.cache_sets,
        args.cache.cache_set_size,
        store.clone(),
    ));

    let listener = SocketServer::bind("server", &args.listen).await?;
    tracing::info!("Standalone server listening on {}", listener.local_addr()?);
    let serve_task = listener.spawn(Arc::new(ServerClientHandler::new(
        server,
        args.cache.workers,
        Duration::from_millis(args.timeout_ms),
    )));

    {
        let store = store.clone();
        let path = args.store.clone();
        let every = Duration::from_secs(args.dump_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.dump_to_file(&path) {
                    tracing::error!("Dump to {} failed: {:#}", path.display(), e);
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        res = serve_task => anyhow::bail!("server listener stopped: {:?}", res),
    }

    store.dump_to_file(&args.store)?;
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<()> {
    let (host, port) = split_address(&args.server)?;
    let client = KvClient::new(host, port, Duration::from_millis(args.timeout_ms));

    match args.op {
        ClientOp::Put { key, value } => {
            client.put(&key, &value).await?;
            println!("{}", SUCCESS);
        }
        ClientOp::Get { key } => {
            println!("{}", client.get(&key).await?);
        }
        ClientOp::Del { key } => {
            client.del(&key).await?;
            println!("{}", SUCCESS);
        }
    }
    Ok(())
}
