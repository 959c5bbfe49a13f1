//! # Parley
//!
//! A small multi-room chat server speaking a line-oriented TCP protocol.
//!
//! Clients send requests (`CONNECT`, `JOIN`, `MSG`, ...) on short-lived
//! connections and get one response line per request. Chat traffic is
//! pushed back to each user's callback listener, which sits at the
//! client's source port plus a fixed offset.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let server = ParleyServer::builder()
//!     .bind("0.0.0.0:9999")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod client;
mod config;
mod connection;
mod dispatcher;
mod error;
mod fanout;
mod server;

pub use config::{DEFAULT_CALLBACK_PORT_OFFSET, DEFAULT_PORT, ServerConfig};
pub use dispatcher::{Delivery, Dispatch, Dispatcher, Outcome, SYSTEM_NICK, callback_address};
pub use error::ParleyError;
pub use fanout::{DeliveryReport, Messenger, TcpMessenger};
pub use server::{ParleyServer, ParleyServerBuilder};

pub use parley_directory::{Directory, DirectoryError, Peer, User};
pub use parley_protocol::{
    Codec, JsonCodec, LineCodec, NO_ROOM, Opcode, Packet, PacketKind, ProtocolError, Status,
};
pub use parley_transport::TransportError;

/// Everything needed to run a server or write a client.
pub mod prelude {
    pub use crate::client::{Client, Inbox};
    pub use crate::{
        Codec, Directory, LineCodec, Packet, PacketKind, ParleyError, ParleyServer,
        ParleyServerBuilder, ServerConfig, Status,
    };
}
