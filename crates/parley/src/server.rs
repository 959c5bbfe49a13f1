//! `ParleyServer` builder and accept loop.
//!
//! This is the entry point for running a Parley server. It ties together
//! all the layers: transport → protocol → dispatcher → directory, with the
//! messenger pushing fan-outs back out.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_directory::Directory;
use parley_protocol::{Codec, LineCodec, Packet};
use parley_transport::{Connection, TcpTransport, Transport};
use tokio::task::JoinSet;

use crate::connection::handle_connection;
use crate::{Delivery, Dispatcher, Messenger, ParleyError, ServerConfig, TcpMessenger};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) directory: Arc<Directory>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) messenger: TcpMessenger<C>,
    pub(crate) codec: Arc<C>,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), parley::ParleyError> {
/// use parley::prelude::*;
///
/// let server = ParleyServer::builder()
///     .bind("0.0.0.0:9999")
///     .callback_port_offset(100)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ParleyServerBuilder {
    config: ServerConfig,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting at once, e.g. with a loaded config file.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn callback_port_offset(mut self, offset: u16) -> Self {
        self.config.callback_port_offset = offset;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.config.push_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn fanout_concurrency(mut self, concurrency: usize) -> Self {
        self.config.fanout_concurrency = concurrency;
        self
    }

    pub fn shutdown_reason(mut self, reason: impl Into<String>) -> Self {
        self.config.shutdown_reason = reason.into();
        self
    }

    /// Binds the listener using the line codec.
    pub async fn build(self) -> Result<ParleyServer<LineCodec>, ParleyError> {
        self.build_with_codec(LineCodec).await
    }

    /// Binds the listener using `codec` for every frame, pushes included.
    ///
    /// # Errors
    /// [`ParleyError::Transport`] if the address can't be bound.
    pub async fn build_with_codec<C: Codec>(
        self,
        codec: C,
    ) -> Result<ParleyServer<C>, ParleyError> {
        let config = self.config;
        let transport = TcpTransport::bind(&config.bind_addr)
            .await?
            .with_max_frame_len(config.max_frame_len);

        let directory = Arc::new(Directory::new());
        let codec = Arc::new(codec);
        let state = Arc::new(ServerState {
            dispatcher: Dispatcher::new(Arc::clone(&directory), config.callback_port_offset),
            messenger: TcpMessenger::new(
                Arc::clone(&directory),
                Arc::clone(&codec),
                config.push_timeout(),
                config.fanout_concurrency,
            ),
            directory,
            codec,
            config,
        });

        Ok(ParleyServer { transport, state })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A bound Parley server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct ParleyServer<C: Codec = LineCodec> {
    transport: TcpTransport,
    state: Arc<ServerState<C>>,
}

impl ParleyServer<LineCodec> {
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }
}

impl<C: Codec> ParleyServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The live user and room registry.
    pub fn directory(&self) -> Arc<Directory> {
        Arc::clone(&self.state.directory)
    }

    /// Runs until Ctrl-C, then shuts down gracefully.
    pub async fn run(self) -> Result<(), ParleyError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// On shutdown every connected user is sent a `DISCONNECT` carrying
    /// `ERR` and the configured reason, then the listener is dropped.
    /// Handlers already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ParleyError>
    where
        F: Future<Output = ()> + Send,
    {
        let ParleyServer {
            mut transport,
            state,
        } = self;
        tokio::pin!(shutdown);

        tracing::info!(addr = ?transport.local_addr().ok(), "Parley server running");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let conn_id = conn.id();
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(%conn_id, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }

        notify_shutdown(&state).await;
        drop(transport);
        tracing::info!("Parley server stopped");
        Ok(())
    }
}

/// Pushes the shutdown `DISCONNECT` to every registered user.
async fn notify_shutdown<C: Codec>(state: &Arc<ServerState<C>>) {
    let peers = state.directory.snapshot().await;
    tracing::info!(users = peers.len(), "shutting down, notifying users");

    let mut notices = JoinSet::new();
    for peer in peers {
        let state = Arc::clone(state);
        let packet =
            Packet::disconnect(peer.nick.clone()).into_err(state.config.shutdown_reason.clone());
        notices.spawn(async move {
            state
                .messenger
                .deliver(Delivery {
                    packet,
                    recipients: vec![peer],
                })
                .await
        });
    }
    while notices.join_next().await.is_some() {}
}
