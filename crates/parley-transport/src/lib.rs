//! Transport layer for Parley.
//!
//! Parley runs over plain TCP with one frame per `\n`-terminated line.
//! Two kinds of connection exist:
//!
//! - **Request/response**: a client connects to the server, writes request
//!   lines and reads one response line per request ([`TcpTransport`],
//!   [`TcpConnection`]).
//! - **Push**: the server connects to a client's callback listener, writes
//!   one frame and hangs up ([`push`]).
//!
//! The [`Transport`] and [`Connection`] traits describe the first kind so
//! the server's accept loop doesn't depend on socket details.

#![allow(async_fn_in_trait)]

mod error;
mod push;
mod tcp;

pub use error::TransportError;
pub use push::push;
pub use tcp::{DEFAULT_MAX_FRAME_LEN, TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A single line-framed connection.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes one already-encoded frame (including its `\n`).
    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next frame, newline included when the peer sent one.
    ///
    /// Returns `Ok(None)` when the peer closed the connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Shuts down the write half; no further frames are sent.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The remote address. The server derives callback addresses from it.
    fn peer_addr(&self) -> SocketAddr;
}
