//! One-shot outbound delivery to a callback listener.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

use crate::TransportError;

/// Connects to `addr`, writes `frame`, and closes the connection.
///
/// Nothing is read back. The connect and the write are each bounded by
/// `timeout`, so an unresponsive client costs at most twice that.
///
/// # Errors
/// - [`TransportError::ConnectFailed`]: refused or unreachable
/// - [`TransportError::TimedOut`]: connect or write took too long
/// - [`TransportError::SendFailed`]: the write itself failed
pub async fn push(
    addr: SocketAddr,
    frame: &[u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let mut stream = time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::TimedOut("push connect"))?
        .map_err(|source| TransportError::ConnectFailed { addr, source })?;

    time::timeout(timeout, async {
        stream.write_all(frame).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| TransportError::TimedOut("push write"))?
    .map_err(TransportError::SendFailed)?;

    tracing::trace!(%addr, bytes = frame.len(), "pushed frame");
    Ok(())
}
