//! Client-side helpers.
//!
//! A Parley client talks to the server over short request connections and
//! receives pushed packets on a listener of its own:
//!
//! ```text
//! client:L  ── CONNECT ann ──────────▶  server:9999
//! client:L  ◀─ CONNECT ann OK ───────   server:9999
//!
//! client:L+100  ◀── MSG bob 1 hi lobby ──  (server pushes)
//! ```
//!
//! [`request`] performs one request/response on a fresh connection.
//! [`Client::connect`] registers a nick and returns an [`Inbox`] bound to
//! the callback port the server will derive.

use std::net::SocketAddr;
use std::time::Duration;

use parley_protocol::{Codec, LineCodec, Packet};
use parley_transport::{Connection, DEFAULT_MAX_FRAME_LEN, TcpConnection, TransportError};
use tokio::net::TcpListener;
use tokio::time;

use crate::ParleyError;
use crate::config::DEFAULT_CALLBACK_PORT_OFFSET;

/// How long a request may take end to end unless told otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Source ports tried before giving up on finding a free callback port.
const CALLBACK_ATTEMPTS: usize = 16;

/// Sends `packet` on a fresh connection and returns the server's response.
///
/// An `ERR` response is returned as a packet, not as an error; only
/// transport and framing problems fail.
pub async fn request<C: Codec>(
    server: SocketAddr,
    codec: &C,
    packet: &Packet,
    timeout: Duration,
) -> Result<Packet, ParleyError> {
    let conn = time::timeout(timeout, TcpConnection::connect(server))
        .await
        .map_err(|_| TransportError::TimedOut("connect"))??;
    let response = exchange(&conn, codec, packet, timeout).await;
    // Best effort; the server closes its side on its own.
    let _ = conn.close().await;
    response
}

async fn exchange<C: Codec>(
    conn: &TcpConnection,
    codec: &C,
    packet: &Packet,
    timeout: Duration,
) -> Result<Packet, ParleyError> {
    let bytes = codec.encode(packet)?;
    time::timeout(timeout, conn.send(&bytes))
        .await
        .map_err(|_| TransportError::TimedOut("request"))??;

    let frame = time::timeout(timeout, conn.recv())
        .await
        .map_err(|_| TransportError::TimedOut("response"))??
        .ok_or(ParleyError::ConnectionClosed)?;
    Ok(codec.decode(&frame)?)
}

/// A registered user.
pub struct Client<C: Codec + Clone = LineCodec> {
    server: SocketAddr,
    nick: String,
    codec: C,
    timeout: Duration,
}

impl Client<LineCodec> {
    /// Registers `nick` with the server at `server` using the default
    /// callback offset and the line codec.
    pub async fn connect(server: SocketAddr, nick: &str) -> Result<(Self, Inbox), ParleyError> {
        Self::connect_with(server, nick, LineCodec, DEFAULT_CALLBACK_PORT_OFFSET).await
    }
}

impl<C: Codec + Clone> Client<C> {
    /// Registers `nick`, binding the callback listener first.
    ///
    /// The server derives the callback address from the source port of the
    /// `CONNECT` connection, so the listener is bound at that port plus
    /// `offset` before the request is written. If that port is taken, a
    /// new connection (and with it a new source port) is tried.
    ///
    /// # Errors
    /// [`ParleyError::Rejected`] if the server refuses the nick, or
    /// [`ParleyError::CallbackUnavailable`] if no callback port was free.
    pub async fn connect_with(
        server: SocketAddr,
        nick: &str,
        codec: C,
        offset: u16,
    ) -> Result<(Self, Inbox<C>), ParleyError> {
        let timeout = DEFAULT_REQUEST_TIMEOUT;

        for attempt in 1..=CALLBACK_ATTEMPTS {
            let conn = time::timeout(timeout, TcpConnection::connect(server))
                .await
                .map_err(|_| TransportError::TimedOut("connect"))??;
            let Some(local) = conn.local_addr() else {
                continue;
            };
            let Some(port) = local.port().checked_add(offset) else {
                tracing::debug!(%local, attempt, "callback port out of range, retrying");
                continue;
            };

            let listener = match TcpListener::bind((local.ip(), port)).await {
                Ok(listener) => listener,
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    tracing::debug!(port, attempt, "callback port taken, retrying");
                    continue;
                }
                Err(e) => return Err(TransportError::AcceptFailed(e).into()),
            };

            let response = exchange(&conn, &codec, &Packet::connect(nick), timeout).await?;
            let _ = conn.close().await;
            if let Some(reason) = response.error_text() {
                return Err(ParleyError::Rejected(reason.to_owned()));
            }

            tracing::debug!(%nick, callback = %local.ip(), port, "connected");
            let client = Self {
                server,
                nick: nick.to_owned(),
                codec: codec.clone(),
                timeout,
            };
            let inbox = Inbox {
                listener,
                codec,
                timeout,
            };
            return Ok((client, inbox));
        }

        Err(ParleyError::CallbackUnavailable(CALLBACK_ATTEMPTS))
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Sets how long each request may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a request and returns the response, `ERR` included.
    pub async fn send(&self, packet: &Packet) -> Result<Packet, ParleyError> {
        request(self.server, &self.codec, packet, self.timeout).await
    }

    /// Sends a request and fails with [`ParleyError::Rejected`] on `ERR`.
    pub async fn send_ok(&self, packet: &Packet) -> Result<Packet, ParleyError> {
        let response = self.send(packet).await?;
        match response.error_text() {
            Some(reason) => Err(ParleyError::Rejected(reason.to_owned())),
            None => Ok(response),
        }
    }

    /// Unregisters this client's nick.
    pub async fn disconnect(self) -> Result<(), ParleyError> {
        self.send_ok(&Packet::disconnect(self.nick.as_str())).await?;
        Ok(())
    }
}

/// The client's callback listener.
///
/// Each pushed packet arrives on its own short-lived connection.
pub struct Inbox<C: Codec = LineCodec> {
    listener: TcpListener,
    codec: C,
    timeout: Duration,
}

impl<C: Codec> Inbox<C> {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Sets how long a pusher may take to send its frame once connected.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Waits for the next pushed packet.
    ///
    /// Waiting for a connection is unbounded. Once one arrives, its frame
    /// must follow within the inbox timeout.
    pub async fn recv(&self) -> Result<Packet, ParleyError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::new(stream, peer, DEFAULT_MAX_FRAME_LEN);
        let frame = time::timeout(self.timeout, conn.recv())
            .await
            .map_err(|_| TransportError::TimedOut("push"))??
            .ok_or(ParleyError::ConnectionClosed)?;
        Ok(self.codec.decode(&frame)?)
    }
}
