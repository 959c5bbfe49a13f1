//! Wire protocol for Parley.
//!
//! This crate defines the language clients and the directory server speak:
//!
//! - **Types** ([`Packet`], [`PacketKind`], [`Opcode`], [`Status`]): the
//!   eleven packet kinds and their request/response shapes.
//! - **Codec** ([`Codec`] trait, [`LineCodec`], [`JsonCodec`]): how packets
//!   become newline-terminated frames and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets, users or rooms. It sits
//! between the transport (raw lines) and the dispatcher (directory state).
//!
//! ```text
//! Transport (lines) → Protocol (Packet) → Dispatcher (Directory)
//! ```

mod codec;
mod error;
mod line;
mod types;

pub use codec::{Codec, LineCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{NO_ROOM, Opcode, Packet, PacketKind, Status};
