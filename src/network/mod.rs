//! Network Module
//!
//! Both retrieval transports.
//!
//! ## Architecture
//! - `loopback`: axum service for `GET /<namespace>?key=<hex>` on `127.0.0.1:<ephemeral>`
//! - `http`: reqwest client that consumers use against a loopback endpoint
//! - `server`: acceptor thread, one worker thread per connection, cooperative shutdown
//! - `connection` + `gateway`: framed structured calls over a Unix socket, on `server`

mod http;
mod loopback;

#[cfg(unix)]
mod connection;
#[cfg(unix)]
mod gateway;
#[cfg(unix)]
mod server;

pub use http::{fetch, DEFAULT_MAX_RESPONSE_SIZE};
pub use loopback::{LoopbackServer, OCTET_STREAM};

#[cfg(unix)]
pub use connection::Connection;
#[cfg(unix)]
pub use gateway::{GatewayClient, GatewayServer};
#[cfg(unix)]
pub use server::{ConnectionTimeouts, Handler, Listener, Server, Stream};
