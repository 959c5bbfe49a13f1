//! Per-connection handler: read requests, dispatch, reply.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The loop:
//!   1. Receive a frame (bounded by the read timeout)
//!   2. Decode it; a bad frame ends the connection without a reply
//!   3. Dispatch it and hand any fan-out to a detached delivery task
//!   4. Send the response, closing afterwards if the dispatcher said so

use std::sync::Arc;

use parley_protocol::Codec;
use parley_transport::{Connection, TcpConnection, TransportError};
use tokio::time;

use crate::server::ServerState;
use crate::{Delivery, Dispatch, Messenger, ParleyError};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: TcpConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ParleyError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    loop {
        let frame = match time::timeout(state.config.read_timeout(), conn.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::debug!(%conn_id, "connection idle, closing");
                break;
            }
        };

        let request = state.codec.decode(&frame)?;
        tracing::debug!(%conn_id, opcode = %request.opcode(), "request received");

        let Dispatch { outcome, delivery } = state.dispatcher.dispatch(request, peer).await;
        if let Some(delivery) = delivery {
            spawn_delivery(&state, delivery);
        }

        let bytes = state.codec.encode(outcome.packet())?;
        time::timeout(state.config.read_timeout(), conn.send(&bytes))
            .await
            .map_err(|_| TransportError::TimedOut("reply"))??;

        if outcome.closes() {
            tracing::debug!(%conn_id, "closing after final reply");
            conn.close().await?;
            break;
        }
    }

    Ok(())
}

/// Runs a delivery in the background so the requester's reply isn't held
/// up by slow recipients.
fn spawn_delivery<C: Codec>(state: &Arc<ServerState<C>>, delivery: Delivery) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let opcode = delivery.packet.opcode();
        let report = state.messenger.deliver(delivery).await;
        tracing::debug!(
            %opcode,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "delivery finished"
        );
    });
}
