//! Loopback HTTP Endpoint
//!
//! Serves committed blobs to other processes on the same device:
//!
//! ```text
//! GET /<namespace>?key=<hex>  ->  200 OK, application/octet-stream, blob bytes
//! anything else               ->  404 Not Found, empty body
//! ```
//!
//! Bound to `127.0.0.1` on an ephemeral port, so it is never reachable from
//! other hosts. The axum service runs on a tokio runtime owned by the
//! endpoint's background thread; blob reads go to the blocking pool.

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{CacheError, Result};
use crate::handle::{Handle, KEY_PARAMETER};
use crate::key::CacheKey;
use crate::store::BlobStore;

/// Content type of served blobs
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How long shutdown waits for blob reads already in progress
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// State shared by every request
struct EndpointState {
    store: Arc<BlobStore>,
    /// `/<namespace>`
    path: String,
}

/// HTTP endpoint over one namespace's store
pub struct LoopbackServer {
    namespace: String,
    local_addr: SocketAddr,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackServer {
    /// Bind `127.0.0.1:0` and start serving `store` under `/<namespace>`
    pub fn start(store: Arc<BlobStore>, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let bind_addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        let bind_error = |e: std::io::Error| CacheError::ServerBind(format!("{}: {}", bind_addr, e));

        let listener = TcpListener::bind(bind_addr).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(format!("loopback-{}", namespace))
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener).map_err(bind_error)?
        };

        let app = router(store, &namespace);
        let (stop, stopped) = oneshot::channel::<()>();
        let name = namespace.clone();
        let worker = thread::Builder::new()
            .name(format!("loopback-{}", namespace))
            .spawn(move || {
                runtime.block_on(async move {
                    tokio::select! {
                        result = axum::serve(listener, app).into_future() => {
                            if let Err(e) = result {
                                tracing::warn!("Loopback endpoint for '{}' failed: {}", name, e);
                            }
                        }
                        _ = stopped => {}
                    }
                });
                // Connections still open are cancelled with the runtime.
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            })?;

        tracing::info!("Loopback endpoint for '{}' listening on http://{}", namespace, local_addr);

        Ok(Self {
            namespace,
            local_addr,
            stop: Mutex::new(Some(stop)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Network handle for `key` served by this endpoint
    pub fn handle_for(&self, key: &CacheKey) -> Handle {
        Handle::network(self.local_addr, self.namespace.clone(), key.clone())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop accepting, cancel open connections and release the port
    pub fn shutdown(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("Loopback thread for '{}' panicked", self.namespace);
            }
            tracing::info!("Loopback endpoint for '{}' stopped", self.namespace);
        }
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Every request lands in one handler, so all misses share one response
fn router(store: Arc<BlobStore>, namespace: &str) -> Router {
    let state = Arc::new(EndpointState {
        store,
        path: format!("/{}", namespace),
    });
    Router::new().fallback(serve_blob).with_state(state)
}

async fn serve_blob(
    State(state): State<Arc<EndpointState>>,
    method: Method,
    uri: Uri,
) -> Response {
    let key = match requested_key(&state.path, &method, &uri) {
        Some(key) => key,
        None => return not_found(),
    };

    let store = Arc::clone(&state.store);
    let read = tokio::task::spawn_blocking(move || {
        let result = store.get(&key);
        (key, result)
    })
    .await;

    match read {
        Ok((_, Ok(Some(bytes)))) => blob(bytes),
        Ok((_, Ok(None))) => not_found(),
        Ok((key, Err(e))) => {
            tracing::warn!("Read of {} failed: {}", key, e);
            not_found()
        }
        Err(e) => {
            tracing::warn!("Blob read task failed: {}", e);
            not_found()
        }
    }
}

/// The key asked for, if the request is a well-formed blob read
fn requested_key(path: &str, method: &Method, uri: &Uri) -> Option<CacheKey> {
    if method != Method::GET || uri.path() != path {
        return None;
    }
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == KEY_PARAMETER)
        .and_then(|(_, value)| CacheKey::parse(&value).ok())
}

fn blob(bytes: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, OCTET_STREAM),
            (header::CONNECTION, "close"),
        ],
        bytes,
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")]).into_response()
}
