//! Packet types: everything that travels over a Parley connection.
//!
//! A packet is a kind-specific body ([`PacketKind`]) plus an optional
//! [`Status`]. Requests carry no status; the server answers with the same
//! kind and `OK` or `ERR` filled in. Packets pushed to a client's callback
//! listener are plain requests (no status), just like the one the sender
//! originally issued.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Room name that `List` uses on the wire for "no room given".
pub const NO_ROOM: &str = "None";

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// The fixed tag identifying a packet's kind.
///
/// The set is closed: adding an opcode means adding a [`PacketKind`]
/// variant, and every `match` over kinds in the server stops compiling
/// until the new kind is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    KeepAlive,
    Connect,
    Disconnect,
    Message,
    PrivateMessage,
    Broadcast,
    List,
    Join,
    Leave,
    Create,
    Destroy,
}

impl Opcode {
    /// Every opcode, in wire-number order.
    pub const ALL: [Opcode; 11] = [
        Self::KeepAlive,
        Self::Connect,
        Self::Disconnect,
        Self::Message,
        Self::PrivateMessage,
        Self::Broadcast,
        Self::List,
        Self::Join,
        Self::Leave,
        Self::Create,
        Self::Destroy,
    ];

    /// The token written as the first field of every frame.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepAlive => "KEEP_ALIVE",
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MSG",
            Self::PrivateMessage => "PRIVATE_MSG",
            Self::Broadcast => "BROADCAST_MSG",
            Self::List => "LIST",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::Create => "CREATE",
            Self::Destroy => "DESTROY",
        }
    }

    /// Looks up an opcode by its wire token. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The outcome carried by a response packet.
///
/// The error text lives inside `Err`, so a response can't claim success
/// and carry an error message at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Err(String),
}

impl Status {
    /// The wire token for this status (`OK` or `ERR`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Err(_) => "ERR",
        }
    }
}

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// Kind-specific packet fields.
///
/// `#[serde(tag = "type")]` gives the JSON codec an internally tagged
/// shape: `{ "type": "Join", "username": "ann", "room": "lobby" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PacketKind {
    /// Liveness probe; the server echoes it with `OK`.
    KeepAlive,

    /// Registers `username`. The server derives the callback address
    /// from the connection this packet arrived on.
    Connect {
        username: String,
        /// Free-form client settings. A `BTreeMap` keeps the encoded
        /// order stable.
        #[serde(default)]
        config: BTreeMap<String, String>,
    },

    /// Unregisters `username`. From the server this doubles as the
    /// shutdown notice pushed to every client.
    Disconnect { username: String },

    /// A chat line sent to every member of `room`.
    Message {
        username: String,
        room: String,
        text: String,
    },

    /// A chat line sent to a single user.
    PrivateMessage {
        username: String,
        recipient: String,
        text: String,
    },

    /// One chat line sent to the members of several rooms at once.
    Broadcast {
        username: String,
        text: String,
        rooms: Vec<String>,
    },

    /// Lists all rooms (`room: None`) or the members of one room.
    /// `items` is empty on the request and filled in on the response.
    List {
        room: Option<String>,
        #[serde(default)]
        items: Vec<String>,
    },

    Join { username: String, room: String },

    Leave { username: String, room: String },

    Create { room: String },

    Destroy { room: String },
}

impl PacketKind {
    /// Returns the opcode for this kind.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::KeepAlive => Opcode::KeepAlive,
            Self::Connect { .. } => Opcode::Connect,
            Self::Disconnect { .. } => Opcode::Disconnect,
            Self::Message { .. } => Opcode::Message,
            Self::PrivateMessage { .. } => Opcode::PrivateMessage,
            Self::Broadcast { .. } => Opcode::Broadcast,
            Self::List { .. } => Opcode::List,
            Self::Join { .. } => Opcode::Join,
            Self::Leave { .. } => Opcode::Leave,
            Self::Create { .. } => Opcode::Create,
            Self::Destroy { .. } => Opcode::Destroy,
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A single protocol frame.
///
/// ```rust
/// use parley_protocol::{Packet, Status};
///
/// let request = Packet::join("ann", "lobby");
/// assert!(request.is_request());
///
/// let reply = request.clone().into_err("was not able to join the room");
/// assert_eq!(reply.error_text(), Some("was not able to join the room"));
/// assert_eq!(reply.kind, request.kind);
/// # let _ = Status::Ok;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub kind: PacketKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Packet {
    /// Wraps a kind as a request (no status).
    pub fn request(kind: PacketKind) -> Self {
        Self { kind, status: None }
    }

    pub fn keep_alive() -> Self {
        Self::request(PacketKind::KeepAlive)
    }

    pub fn connect(username: impl Into<String>) -> Self {
        Self::request(PacketKind::Connect {
            username: username.into(),
            config: BTreeMap::new(),
        })
    }

    pub fn disconnect(username: impl Into<String>) -> Self {
        Self::request(PacketKind::Disconnect {
            username: username.into(),
        })
    }

    pub fn message(
        username: impl Into<String>,
        room: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::request(PacketKind::Message {
            username: username.into(),
            room: room.into(),
            text: text.into(),
        })
    }

    pub fn private_message(
        username: impl Into<String>,
        recipient: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::request(PacketKind::PrivateMessage {
            username: username.into(),
            recipient: recipient.into(),
            text: text.into(),
        })
    }

    pub fn broadcast<I, S>(
        username: impl Into<String>,
        text: impl Into<String>,
        rooms: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::request(PacketKind::Broadcast {
            username: username.into(),
            text: text.into(),
            rooms: rooms.into_iter().map(Into::into).collect(),
        })
    }

    /// A `List` request. `None` lists rooms; `Some(room)` lists members.
    pub fn list(room: Option<&str>) -> Self {
        Self::request(PacketKind::List {
            room: room.map(str::to_owned),
            items: Vec::new(),
        })
    }

    pub fn join(username: impl Into<String>, room: impl Into<String>) -> Self {
        Self::request(PacketKind::Join {
            username: username.into(),
            room: room.into(),
        })
    }

    pub fn leave(username: impl Into<String>, room: impl Into<String>) -> Self {
        Self::request(PacketKind::Leave {
            username: username.into(),
            room: room.into(),
        })
    }

    pub fn create(room: impl Into<String>) -> Self {
        Self::request(PacketKind::Create { room: room.into() })
    }

    pub fn destroy(room: impl Into<String>) -> Self {
        Self::request(PacketKind::Destroy { room: room.into() })
    }

    /// Turns this packet into an `OK` response of the same kind.
    pub fn into_ok(mut self) -> Self {
        self.status = Some(Status::Ok);
        self
    }

    /// Turns this packet into an `ERR` response of the same kind.
    pub fn into_err(mut self, message: impl Into<String>) -> Self {
        self.status = Some(Status::Err(message.into()));
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.kind.opcode()
    }

    /// `true` when no status is attached.
    pub fn is_request(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Some(Status::Ok))
    }

    /// The error text of an `ERR` response, `None` otherwise.
    pub fn error_text(&self) -> Option<&str> {
        match &self.status {
            Some(Status::Err(text)) => Some(text),
            _ => None,
        }
    }
}

impl From<PacketKind> for Packet {
    fn from(kind: PacketKind) -> Self {
        Self::request(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_tokens_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_token(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_opcode_tokens_are_case_sensitive() {
        assert_eq!(Opcode::from_token("msg"), None);
        assert_eq!(Opcode::from_token("MSG"), Some(Opcode::Message));
    }

    #[test]
    fn test_opcode_display_matches_wire_token() {
        assert_eq!(Opcode::Broadcast.to_string(), "BROADCAST_MSG");
        assert_eq!(Opcode::KeepAlive.to_string(), "KEEP_ALIVE");
    }

    #[test]
    fn test_kind_reports_its_opcode() {
        assert_eq!(Packet::create("x").opcode(), Opcode::Create);
        assert_eq!(Packet::list(None).opcode(), Opcode::List);
        assert_eq!(
            Packet::private_message("a", "b", "hi").opcode(),
            Opcode::PrivateMessage
        );
    }

    #[test]
    fn test_into_ok_keeps_kind() {
        let reply = Packet::join("ann", "lobby").into_ok();
        assert!(reply.is_ok());
        assert!(!reply.is_request());
        assert_eq!(reply.error_text(), None);
        assert_eq!(reply.opcode(), Opcode::Join);
    }

    #[test]
    fn test_into_err_carries_text() {
        let reply = Packet::create("lobby").into_err("room lobby already exists");
        assert!(!reply.is_ok());
        assert_eq!(reply.error_text(), Some("room lobby already exists"));
    }

    #[test]
    fn test_broadcast_constructor_keeps_room_order() {
        let packet = Packet::broadcast("ann", "hi", ["r2", "r1"]);
        match packet.kind {
            PacketKind::Broadcast { rooms, .. } => {
                assert_eq!(rooms, vec!["r2".to_string(), "r1".to_string()]);
            }
            other => panic!("expected Broadcast, got {other:?}"),
        }
    }
}
