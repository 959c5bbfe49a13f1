//! Request dispatch: one decoded packet in, one response (plus maybe a
//! fan-out) out.
//!
//! The dispatcher never touches the network. It validates a request
//! against the [`Directory`], applies its effect, and describes what should
//! happen next as a [`Dispatch`]. The connection handler sends the reply;
//! the [`Messenger`](crate::Messenger) performs the delivery.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parley_directory::{Directory, DirectoryError, Peer};
use parley_protocol::{NO_ROOM, Packet, PacketKind};

/// Username carried by messages the server itself generates.
pub const SYSTEM_NICK: &str = "server";

const CONNECT_FAILED: &str = "user already exists";
const CALLBACK_INVALID: &str = "invalid callback address";
const JOIN_FAILED: &str = "was not able to join the room";
const LEAVE_FAILED: &str = "was not able to leave the room";
const MESSAGE_FAILED: &str = "could not send message";
const PRIVATE_MESSAGE_FAILED: &str = "could not send private message";
const BROADCAST_FAILED: &str = "could not broadcast message";

/// What to do with the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send the packet and keep reading requests.
    Reply(Packet),
    /// Send the packet, then close the connection.
    ReplyThenClose(Packet),
}

impl Outcome {
    pub fn packet(&self) -> &Packet {
        match self {
            Self::Reply(packet) | Self::ReplyThenClose(packet) => packet,
        }
    }

    pub fn closes(&self) -> bool {
        matches!(self, Self::ReplyThenClose(_))
    }
}

/// A packet to push to a set of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub packet: Packet,
    pub recipients: Vec<Peer>,
}

impl Delivery {
    /// Returns `None` when there is nobody to deliver to.
    fn to(packet: Packet, recipients: Vec<Peer>) -> Option<Self> {
        (!recipients.is_empty()).then_some(Self { packet, recipients })
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub outcome: Outcome,
    pub delivery: Option<Delivery>,
}

impl Dispatch {
    fn reply(packet: Packet) -> Self {
        Self {
            outcome: Outcome::Reply(packet),
            delivery: None,
        }
    }

    fn reply_and_deliver(packet: Packet, delivery: Option<Delivery>) -> Self {
        Self {
            outcome: Outcome::Reply(packet),
            delivery,
        }
    }

    fn close(packet: Packet) -> Self {
        Self {
            outcome: Outcome::ReplyThenClose(packet),
            delivery: None,
        }
    }
}

/// Maps requests onto directory operations.
pub struct Dispatcher {
    directory: Arc<Directory>,
    callback_port_offset: u16,
}

impl Dispatcher {
    pub fn new(directory: Arc<Directory>, callback_port_offset: u16) -> Self {
        Self {
            directory,
            callback_port_offset,
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Handles one request that arrived from `peer`.
    ///
    /// Every request gets exactly one response of the same kind. Failures
    /// become `ERR` responses; nothing here is fatal to the server.
    pub async fn dispatch(&self, request: Packet, peer: SocketAddr) -> Dispatch {
        if !request.is_request() {
            tracing::debug!(%peer, opcode = %request.opcode(), "status on request ignored");
        }
        let echo = Packet::request(request.kind.clone());

        match request.kind {
            PacketKind::KeepAlive => Dispatch::reply(echo.into_ok()),
            PacketKind::Connect { username, config } => {
                self.connect(echo, &username, &config, peer).await
            }
            PacketKind::Disconnect { username } => self.disconnect(echo, &username).await,
            PacketKind::Create { room } if room == NO_ROOM => {
                Dispatch::reply(echo.into_err(format!("room name {NO_ROOM} is reserved")))
            }
            PacketKind::Create { room } => {
                Dispatch::reply(respond(echo, self.directory.create_room(&room).await))
            }
            PacketKind::Destroy { room } => {
                Dispatch::reply(respond(echo, self.directory.destroy_room(&room).await))
            }
            PacketKind::Join { username, room } => self.join(echo, &username, &room).await,
            PacketKind::Leave { username, room } => self.leave(echo, &username, &room).await,
            PacketKind::List { room, .. } => self.list(room).await,
            PacketKind::Message { username, room, .. } => {
                match self.directory.room_audience(&username, &room).await {
                    Ok(peers) => Dispatch::reply_and_deliver(
                        echo.clone().into_ok(),
                        Delivery::to(echo, peers),
                    ),
                    Err(err) => failed(echo, &err, MESSAGE_FAILED),
                }
            }
            PacketKind::PrivateMessage {
                username,
                recipient,
                ..
            } => self.private_message(echo, &username, &recipient).await,
            PacketKind::Broadcast {
                username, rooms, ..
            } => match self.directory.broadcast_audience(&username, &rooms).await {
                Ok(peers) => {
                    Dispatch::reply_and_deliver(echo.clone().into_ok(), Delivery::to(echo, peers))
                }
                Err(err) => failed(echo, &err, BROADCAST_FAILED),
            },
        }
    }

    async fn connect(
        &self,
        echo: Packet,
        username: &str,
        config: &BTreeMap<String, String>,
        peer: SocketAddr,
    ) -> Dispatch {
        let Some(callback) = callback_address(peer, self.callback_port_offset) else {
            tracing::debug!(%username, %peer, "callback port out of range");
            return Dispatch::reply(echo.into_err(CALLBACK_INVALID));
        };

        match self.directory.register(username, callback).await {
            Ok(()) => {
                tracing::info!(%username, %callback, settings = config.len(), "user connected");
                Dispatch::reply(echo.into_ok())
            }
            Err(err) => failed(echo, &err, CONNECT_FAILED),
        }
    }

    async fn disconnect(&self, echo: Packet, username: &str) -> Dispatch {
        match self.directory.unregister(username).await {
            Ok(user) => {
                tracing::info!(%username, rooms = user.rooms.len(), "user disconnected");
                Dispatch::close(echo.into_ok())
            }
            Err(err) => Dispatch::reply(echo.into_err(err.to_string())),
        }
    }

    async fn join(&self, echo: Packet, username: &str, room: &str) -> Dispatch {
        match self.directory.join_room(username, room).await {
            Ok(members) => {
                let notice = system_message(room, format!("user {username} joined room {room}"));
                Dispatch::reply_and_deliver(echo.into_ok(), Delivery::to(notice, members))
            }
            Err(err) => failed(echo, &err, JOIN_FAILED),
        }
    }

    async fn leave(&self, echo: Packet, username: &str, room: &str) -> Dispatch {
        match self.directory.leave_room(username, room).await {
            Ok(remaining) => {
                let notice = system_message(room, format!("user {username} left room {room}"));
                Dispatch::reply_and_deliver(echo.into_ok(), Delivery::to(notice, remaining))
            }
            Err(err) => failed(echo, &err, LEAVE_FAILED),
        }
    }

    async fn list(&self, room: Option<String>) -> Dispatch {
        let result = match &room {
            None => Ok(self.directory.list_rooms().await),
            Some(room) => self.directory.list_members(room).await,
        };
        match result {
            Ok(items) => Dispatch::reply(Packet::request(PacketKind::List { room, items }).into_ok()),
            Err(err) => Dispatch::reply(
                Packet::request(PacketKind::List {
                    room,
                    items: Vec::new(),
                })
                .into_err(err.to_string()),
            ),
        }
    }

    async fn private_message(&self, echo: Packet, username: &str, recipient: &str) -> Dispatch {
        let target = match self.directory.peer(username).await {
            Ok(_) => self.directory.peer(recipient).await,
            Err(err) => Err(err),
        };
        match target {
            Ok(target) => Dispatch::reply_and_deliver(
                echo.clone().into_ok(),
                Delivery::to(echo, vec![target]),
            ),
            Err(err) => failed(echo, &err, PRIVATE_MESSAGE_FAILED),
        }
    }
}

/// Where a client connecting from `peer` listens for pushes.
///
/// Returns `None` if the port would overflow.
pub fn callback_address(peer: SocketAddr, offset: u16) -> Option<SocketAddr> {
    let port = peer.port().checked_add(offset)?;
    Some(SocketAddr::new(peer.ip(), port))
}

fn system_message(room: &str, text: String) -> Packet {
    Packet::message(SYSTEM_NICK, room, text)
}

/// `OK`, or `ERR` carrying the directory's own description.
fn respond(echo: Packet, result: Result<(), DirectoryError>) -> Packet {
    match result {
        Ok(()) => echo.into_ok(),
        Err(err) => echo.into_err(err.to_string()),
    }
}

fn failed(echo: Packet, err: &DirectoryError, text: &'static str) -> Dispatch {
    tracing::debug!(opcode = %echo.opcode(), error = %err, "request refused");
    Dispatch::reply(echo.into_err(text))
}
