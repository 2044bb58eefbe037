//! Generic Server
//!
//! Accept loop behind the gateway socket. What happens on a connection is
//! decided by the handler passed in at construction; the server only owns
//! threads and shutdown.

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CacheError, Result};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A connected byte stream the server can cancel from another thread
pub trait Stream: Read + Write + Send + Sized + 'static {
    fn try_clone_stream(&self) -> io::Result<Self>;
    fn shutdown_stream(&self) -> io::Result<()>;
    fn set_stream_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn set_stream_timeouts(&self, read: Option<Duration>, write: Option<Duration>)
        -> io::Result<()>;
    fn peer_description(&self) -> String;
}

/// A listening socket
pub trait Listener: Send + 'static {
    type Stream: Stream;

    fn accept_stream(&self) -> io::Result<Self::Stream>;
    fn set_listener_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::net::Shutdown;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::time::Duration;

    use super::{Listener, Stream};

    impl Stream for UnixStream {
        fn try_clone_stream(&self) -> io::Result<Self> {
            self.try_clone()
        }

        fn shutdown_stream(&self) -> io::Result<()> {
            self.shutdown(Shutdown::Both)
        }

        fn set_stream_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
            self.set_nonblocking(nonblocking)
        }

        fn set_stream_timeouts(
            &self,
            read: Option<Duration>,
            write: Option<Duration>,
        ) -> io::Result<()> {
            self.set_read_timeout(read)?;
            self.set_write_timeout(write)
        }

        fn peer_description(&self) -> String {
            "unix peer".to_string()
        }
    }

    impl Listener for UnixListener {
        type Stream = UnixStream;

        fn accept_stream(&self) -> io::Result<UnixStream> {
            let (stream, _) = self.accept()?;
            Ok(stream)
        }

        fn set_listener_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
            self.set_nonblocking(nonblocking)
        }
    }
}

/// Per-connection socket timeouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl ConnectionTimeouts {
    /// Timeouts from the config (0 ms = none)
    pub fn from_config(config: &Config) -> Self {
        let ms = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            read: ms(config.read_timeout_ms),
            write: ms(config.write_timeout_ms),
        }
    }

    /// Apply to a connected stream
    pub fn apply<S: Stream>(&self, stream: &S) -> io::Result<()> {
        stream.set_stream_timeouts(self.read, self.write)
    }
}

/// Connection handler strategy
pub type Handler<S> = Arc<dyn Fn(S) + Send + Sync + 'static>;

/// Streams of in-flight connections, by connection id
type ActiveStreams<S> = Arc<Mutex<HashMap<u64, S>>>;

/// Untracks a connection when its worker ends, even by panic
struct Tracked<S> {
    id: u64,
    active: ActiveStreams<S>,
}

impl<S> Drop for Tracked<S> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}

/// Background accept loop with one worker thread per connection
///
/// ## Shutdown
/// `shutdown` stops the accept loop, shuts down the sockets of in-flight
/// connections so their handlers fail fast, waits for every worker to exit,
/// and drops the listener (releasing the port or socket).
pub struct Server<S: Stream> {
    name: String,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    active: ActiveStreams<S>,
    workers: Option<WaitGroup>,
}

impl<S: Stream> Server<S> {
    /// Start accepting on `listener`, running `handler` for each connection
    pub fn spawn<L>(name: impl Into<String>, listener: L, handler: Handler<S>) -> Result<Self>
    where
        L: Listener<Stream = S>,
    {
        let name = name.into();
        listener
            .set_listener_nonblocking(true)
            .map_err(|e| CacheError::ServerBind(format!("{}: {}", name, e)))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let active: ActiveStreams<S> = Arc::new(Mutex::new(HashMap::new()));
        let workers = WaitGroup::new();

        let acceptor = {
            let name = name.clone();
            let shutdown = Arc::clone(&shutdown);
            let active = Arc::clone(&active);
            let workers = workers.clone();
            thread::Builder::new()
                .name(format!("{}-accept", name))
                .spawn(move || accept_loop(name, listener, handler, shutdown, active, workers))?
        };

        Ok(Self {
            name,
            shutdown,
            acceptor: Some(acceptor),
            active,
            workers: Some(workers),
        })
    }

    /// Number of connections currently being handled
    pub fn active_connections(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting, cancel in-flight connections and wait for workers
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                tracing::warn!("{} accept thread panicked", self.name);
            }
        }

        let cancelled = {
            let active = self.active.lock();
            for stream in active.values() {
                let _ = stream.shutdown_stream();
            }
            active.len()
        };
        if cancelled > 0 {
            tracing::debug!("{}: cancelled {} in-flight connections", self.name, cancelled);
        }

        if let Some(workers) = self.workers.take() {
            workers.wait();
        }
        tracing::info!("{} stopped", self.name);
    }
}

impl<S: Stream> Drop for Server<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop<L: Listener>(
    name: String,
    listener: L,
    handler: Handler<L::Stream>,
    shutdown: Arc<AtomicBool>,
    active: ActiveStreams<L::Stream>,
    workers: WaitGroup,
) {
    let next_id = AtomicU64::new(0);
    tracing::debug!("{} accepting connections", name);

    while !shutdown.load(Ordering::SeqCst) {
        let stream = match listener.accept_stream() {
            Ok(stream) => stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("{}: accept failed: {}", name, e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        // Accepted sockets may inherit the listener's non-blocking mode.
        if let Err(e) = stream.set_stream_nonblocking(false) {
            tracing::warn!("{}: cannot configure connection: {}", name, e);
            continue;
        }

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        match stream.try_clone_stream() {
            Ok(clone) => {
                active.lock().insert(id, clone);
            }
            Err(e) => {
                tracing::warn!("{}: cannot track connection: {}", name, e);
                continue;
            }
        }

        let handler = Arc::clone(&handler);
        let tracked = Tracked {
            id,
            active: Arc::clone(&active),
        };
        let worker_token = workers.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-conn-{}", name, id))
            .spawn(move || {
                let _tracked = tracked;
                let _worker_token = worker_token;
                handler(stream);
            });

        if let Err(e) = spawned {
            tracing::warn!("{}: cannot spawn worker: {}", name, e);
            if let Some(stream) = active.lock().remove(&id) {
                let _ = stream.shutdown_stream();
            }
        }
    }

    drop(workers);
    tracing::debug!("{} accept loop exited", name);
}
