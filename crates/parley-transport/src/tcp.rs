//! Line-framed TCP transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Largest frame accepted by default, newline included.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP listener handing out [`TcpConnection`]s.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Binds a new transport to the given address.
    ///
    /// # Errors
    /// Returns [`TransportError::AcceptFailed`] if the address can't be
    /// bound. For the server this is the one fatal startup error.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Sets the frame size limit applied to accepted connections.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.max(1);
        self
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::new(stream, peer, self.max_frame_len);
        tracing::debug!(id = %conn.id, %peer, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// One TCP connection carrying newline-terminated frames.
///
/// The read and write halves sit behind separate locks, so a task that is
/// waiting for the next request never blocks a reply being written.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    local: Option<SocketAddr>,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    max_frame_len: usize,
}

impl TcpConnection {
    /// Wraps an established stream.
    pub fn new(stream: TcpStream, peer: SocketAddr, max_frame_len: usize) -> Self {
        let local = stream.local_addr().ok();
        let (read, write) = stream.into_split();
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer,
            local,
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
            max_frame_len: max_frame_len.max(1),
        }
    }

    /// Opens an outbound connection (the client side of a request).
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectFailed`] if the peer is unreachable.
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::ConnectFailed { addr, source })?;
        Ok(Self::new(stream, addr, DEFAULT_MAX_FRAME_LEN))
    }

    /// The local end of the connection, if the OS reported one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut frame = Vec::new();

        // `take` caps how much a single line may buffer, so a peer that
        // never sends `\n` can't grow this Vec without bound.
        let read = (&mut *reader)
            .take(self.max_frame_len as u64)
            .read_until(b'\n', &mut frame)
            .await
            .map_err(TransportError::ReceiveFailed)?;

        if read == 0 {
            return Ok(None);
        }
        if read == self.max_frame_len && frame.last() != Some(&b'\n') {
            return Err(TransportError::FrameTooLong(self.max_frame_len));
        }
        Ok(Some(frame))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
