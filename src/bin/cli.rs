//! scopecache CLI Client
//!
//! Stores files through a running server's gateway and fetches blobs by handle.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scopecache::{Handle, Resolver, Result};

/// scopecache CLI
#[derive(Parser, Debug)]
#[command(name = "scopecache-cli")]
#[command(about = "CLI for the scopecache shared blob cache")]
#[command(version)]
struct Args {
    /// Gateway socket of the server
    #[arg(short, long, default_value = "./scopecache_data/shared_scope_cache.sock")]
    socket: PathBuf,

    /// Timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file and print its handle
    Put {
        /// File to store
        file: PathBuf,
    },

    /// Fetch the blob behind a handle
    Get {
        /// Network or structured handle
        handle: String,

        /// Write the blob here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    match run(&args, timeout) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, timeout: Duration) -> Result<ExitCode> {
    match &args.command {
        Commands::Put { file } => {
            let bytes = std::fs::read(file)?;
            let handle = put(&args.socket, timeout, &bytes)?;
            println!("{}", handle);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Get { handle, out } => {
            let handle = Handle::parse(handle)?;
            let resolver = Resolver::new()
                .with_gateway_socket(&args.socket)
                .with_timeout(timeout);
            match resolver.fetch(&handle)? {
                Some(bytes) => {
                    match out {
                        Some(path) => std::fs::write(path, &bytes)?,
                        None => {
                            use std::io::Write;
                            let mut stdout = std::io::stdout().lock();
                            stdout.write_all(&bytes)?;
                            stdout.flush()?;
                        }
                    }
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("not found");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Commands::Ping => {
            ping(&args.socket, timeout)?;
            println!("PONG");
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(unix)]
fn put(socket: &std::path::Path, timeout: Duration, bytes: &[u8]) -> Result<Handle> {
    let mut client = scopecache::network::GatewayClient::connect(socket)?;
    client.set_timeout(Some(timeout))?;
    client.insert(bytes)
}

#[cfg(unix)]
fn ping(socket: &std::path::Path, timeout: Duration) -> Result<()> {
    let mut client = scopecache::network::GatewayClient::connect(socket)?;
    client.set_timeout(Some(timeout))?;
    client.ping()
}

#[cfg(not(unix))]
fn put(_socket: &std::path::Path, _timeout: Duration, _bytes: &[u8]) -> Result<Handle> {
    Err(scopecache::CacheError::Config("the gateway needs Unix domain sockets".into()))
}

#[cfg(not(unix))]
fn ping(_socket: &std::path::Path, _timeout: Duration) -> Result<()> {
    Err(scopecache::CacheError::Config("the gateway needs Unix domain sockets".into()))
}
