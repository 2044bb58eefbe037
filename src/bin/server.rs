//! scopecache Server Binary
//!
//! Hosts one namespace: the loopback HTTP endpoint and (on Unix) the gateway
//! socket. Runs until stdin is closed.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use scopecache::config::DEFAULT_NAMESPACE;
use scopecache::{CacheRegistry, Config, CrossProcessGateway, JournalSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// scopecache Server
#[derive(Parser, Debug)]
#[command(name = "scopecache-server")]
#[command(about = "Shared content-addressed blob cache for local processes")]
#[command(version)]
struct Args {
    /// Root directory (one subdirectory per namespace)
    #[arg(short, long, default_value = "./scopecache_data")]
    root_dir: PathBuf,

    /// Namespace to serve
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Schema version; bumping it discards cached blobs
    #[arg(long, default_value = "1")]
    schema_version: u32,

    /// Aggregate size budget in bytes
    #[arg(short, long, default_value = "10485760")]
    max_size: u64,

    /// Largest single blob in bytes (defaults to the size budget)
    #[arg(long)]
    max_blob_size: Option<u64>,

    /// fsync the journal after every record
    #[arg(long)]
    sync_every_write: bool,

    /// Gateway socket path (defaults to <root-dir>/<namespace>.sock)
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,scopecache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("scopecache server v{}", scopecache::VERSION);
    tracing::info!("Root directory: {}", args.root_dir.display());
    tracing::info!("Namespace: {}", args.namespace);

    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| args.root_dir.join(format!("{}.sock", args.namespace)));

    // Build config from args
    let mut builder = Config::builder()
        .root_dir(&args.root_dir)
        .namespace(&args.namespace)
        .schema_version(args.schema_version)
        .max_size(args.max_size)
        .gateway_socket(&socket);
    if let Some(limit) = args.max_blob_size {
        builder = builder.max_blob_size(limit);
    }
    if args.sync_every_write {
        builder = builder.journal_sync_strategy(JournalSyncStrategy::EveryWrite);
    }
    let config = builder.build();

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let registry = Arc::new(CacheRegistry::new());
    let cache = match registry.get_or_create(&config) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!("Failed to open cache: {}", e);
            std::process::exit(1);
        }
    };

    // Loopback failure only disables the network transport.
    match cache.loopback() {
        Ok(server) => println!("loopback http://{}/{}", server.local_addr(), cache.namespace()),
        Err(e) => tracing::error!("Loopback endpoint disabled: {}", e),
    }

    let gateway = Arc::new(CrossProcessGateway::new(Arc::clone(&registry), config.clone()));
    let gateway_server = start_gateway(gateway, &socket);

    tracing::info!("Serving until stdin is closed");
    let mut sink = Vec::new();
    if let Err(e) = std::io::stdin().read_to_end(&mut sink) {
        tracing::warn!("stdin error: {}", e);
    }

    tracing::info!("Shutting down...");
    drop(gateway_server);
    if let Err(e) = registry.shutdown() {
        tracing::error!("Shutdown error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

#[cfg(unix)]
fn start_gateway(
    gateway: Arc<CrossProcessGateway>,
    socket: &std::path::Path,
) -> Option<scopecache::network::GatewayServer> {
    match scopecache::network::GatewayServer::bind(gateway, socket) {
        Ok(server) => {
            println!("gateway {}", server.path().display());
            Some(server)
        }
        Err(e) => {
            tracing::error!("Gateway socket disabled: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn start_gateway(_gateway: Arc<CrossProcessGateway>, _socket: &std::path::Path) -> Option<()> {
    tracing::warn!("Gateway socket requires Unix domain sockets; structured handles unavailable");
    None
}
