//! Fan-out delivery: pushing one packet to many callback listeners.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parley_directory::{Directory, Peer};
use parley_protocol::Codec;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::Delivery;

/// Who a delivery reached and who it didn't.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<Peer>,
    pub failed: Vec<Peer>,
}

/// Delivers packets to users' callback listeners.
///
/// Implementations are best-effort: a failed recipient is reported, never
/// retried.
pub trait Messenger: Send + Sync + 'static {
    fn deliver(&self, delivery: Delivery) -> impl Future<Output = DeliveryReport> + Send;
}

/// Pushes each delivery over fresh TCP connections.
///
/// The frame is encoded once and shared. Every recipient gets its own
/// connection; a shared semaphore caps how many are open at a time.
/// Recipients that can't be reached are pruned from the directory.
pub struct TcpMessenger<C: Codec> {
    directory: Arc<Directory>,
    codec: Arc<C>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl<C: Codec> TcpMessenger<C> {
    pub fn new(
        directory: Arc<Directory>,
        codec: Arc<C>,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            directory,
            codec,
            timeout,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

impl<C: Codec> Messenger for TcpMessenger<C> {
    async fn deliver(&self, delivery: Delivery) -> DeliveryReport {
        let Delivery { packet, recipients } = delivery;
        let mut report = DeliveryReport::default();

        let frame: Arc<[u8]> = match self.codec.encode(&packet) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                tracing::warn!(opcode = %packet.opcode(), error = %e, "could not encode delivery");
                return report;
            }
        };

        let mut pushes = JoinSet::new();
        for peer in recipients {
            let frame = Arc::clone(&frame);
            let permits = Arc::clone(&self.permits);
            let timeout = self.timeout;
            pushes.spawn(async move {
                // Held until the push finishes.
                let _permit = permits.acquire_owned().await;
                let result = parley_transport::push(peer.address, &frame, timeout).await;
                (peer, result)
            });
        }

        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => {
                    tracing::debug!(nick = %peer.nick, address = %peer.address, "delivered");
                    report.delivered.push(peer);
                }
                Ok((peer, Err(e))) => {
                    tracing::warn!(
                        nick = %peer.nick,
                        address = %peer.address,
                        error = %e,
                        "delivery failed, pruning recipient"
                    );
                    self.directory.unregister_at(&peer.nick, peer.address).await;
                    report.failed.push(peer);
                }
                Err(e) => tracing::error!(error = %e, "push task failed"),
            }
        }

        report.delivered.sort();
        report.failed.sort();
        report
    }
}
