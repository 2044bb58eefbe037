//! Connection Handler
//!
//! Handles a single gateway client connection.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::gateway::CrossProcessGateway;
use crate::protocol::{read_command, write_response, Response};

use super::server::{ConnectionTimeouts, Stream};

/// Handles a single client connection
pub struct Connection<S: Stream> {
    /// Stream reader (buffered for efficiency)
    reader: BufReader<S>,

    /// Stream writer (buffered for efficiency)
    writer: BufWriter<S>,

    gateway: Arc<CrossProcessGateway>,

    /// Peer description for logging
    peer: String,
}

impl<S: Stream> Connection<S> {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(
        stream: S,
        gateway: Arc<CrossProcessGateway>,
        timeouts: ConnectionTimeouts,
    ) -> Result<Self> {
        let peer = stream.peer_description();
        timeouts.apply(&stream)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone_stream()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            gateway,
            peer,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Gateway connection established from {}", self.peer);

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(CacheError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer, e.kind());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer, e);
                    // Framing is lost; report and close.
                    let _ = write_response(&mut self.writer, &Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received {:?} from {}", command.command_type(), self.peer);
            let response = self.gateway.execute(command);

            if let Err(e) = write_response(&mut self.writer, &response) {
                if let CacheError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer, e);
                return Err(e);
            }
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Errors that mean the peer went away (or timed out) rather than misbehaved
fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
