//! Gateway Socket
//!
//! Carries the structured-call protocol between processes over a Unix
//! domain socket. The server side runs one `Connection` per client on the
//! generic `Server`; the client side is a blocking request/response wrapper.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{CacheError, Result};
use crate::gateway::CrossProcessGateway;
use crate::handle::Handle;
use crate::protocol::{read_response, write_command, Command, Response, Status};

use super::connection::Connection;
use super::server::{ConnectionTimeouts, Handler, Server};

/// Serves a gateway on a Unix socket path
pub struct GatewayServer {
    path: PathBuf,
    server: Mutex<Server<UnixStream>>,
}

impl GatewayServer {
    /// Bind `path` and start serving `gateway`
    ///
    /// A leftover socket file from a dead process is replaced; a socket that
    /// still accepts connections is left alone and the bind fails.
    pub fn bind(gateway: Arc<CrossProcessGateway>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path)
            .map_err(|e| CacheError::ServerBind(format!("{}: {}", path.display(), e)))?;

        let timeouts = ConnectionTimeouts::from_config(gateway.config());
        let name = format!("gateway-{}", gateway.namespace());
        let handler: Handler<UnixStream> = Arc::new(move |stream: UnixStream| {
            let mut connection = match Connection::new(stream, Arc::clone(&gateway), timeouts) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Cannot set up gateway connection: {}", e);
                    return;
                }
            };
            if let Err(e) = connection.handle() {
                tracing::debug!("Gateway connection {} ended: {}", connection.peer(), e);
            }
        });

        let server = match Server::spawn(name, listener, handler) {
            Ok(server) => server,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };
        tracing::info!("Gateway listening on {}", path.display());

        Ok(Self {
            path,
            server: Mutex::new(server),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.server.lock().is_running()
    }

    /// Stop serving and remove the socket file
    pub fn shutdown(&self) {
        let mut server = self.server.lock();
        if !server.is_running() {
            return;
        }
        server.shutdown();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Cannot remove socket {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if UnixStream::connect(path).is_ok() {
        return Err(CacheError::ServerBind(format!(
            "{}: another gateway is listening",
            path.display()
        )));
    }
    tracing::debug!("Removing stale socket {}", path.display());
    std::fs::remove_file(path)
        .map_err(|e| CacheError::ServerBind(format!("{}: {}", path.display(), e)))
}

/// Blocking client for a gateway socket
pub struct GatewayClient {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
}

impl GatewayClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .map_err(|e| CacheError::Network(format!("{}: {}", path.display(), e)))?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Apply the same timeout to reads and writes
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.writer.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Store `bytes`, returning their structured handle
    pub fn insert(&mut self, bytes: &[u8]) -> Result<Handle> {
        let response = self.call(&Command::Insert {
            data: bytes.to_vec(),
        })?;
        match response.status {
            Status::Ok => Handle::parse(&response.text()),
            _ => Err(unexpected(response)),
        }
    }

    /// Look up a handle string or raw key
    pub fn query(&mut self, reference: &str) -> Result<Option<Vec<u8>>> {
        let response = self.call(&Command::Query {
            reference: reference.to_string(),
        })?;
        match response.status {
            Status::Ok => Ok(Some(response.payload)),
            Status::NotFound => Ok(None),
            Status::Error => Err(unexpected(response)),
        }
    }

    pub fn ping(&mut self) -> Result<()> {
        let response = self.call(&Command::Ping)?;
        match response.status {
            Status::Ok => Ok(()),
            _ => Err(unexpected(response)),
        }
    }

    fn call(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }
}

fn unexpected(response: Response) -> CacheError {
    CacheError::Network(format!(
        "gateway replied {:?}: {}",
        response.status,
        response.text()
    ))
}
