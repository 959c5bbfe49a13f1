//! The space-delimited line format.
//!
//! ```text
//! MSG ann 2 hello there lobby OK
//! ^   ^   ^ ^---------^ ^     ^
//! |   |   | text        room  status (absent on requests)
//! |   |   token count for the text
//! |   username
//! opcode
//! ```
//!
//! Free text is never quoted or escaped. Instead it is preceded by the
//! number of whitespace-separated tokens it spans, and the decoder takes
//! exactly that many tokens and joins them with single spaces. Lists use
//! the same trick (count, then one token per item), and so does the
//! Connect config map (pair count, then `key value-count value...`).
//!
//! After the fields comes the status: nothing for a request, `OK`, or
//! `ERR` followed by the error text up to the end of the line.

use crate::{Opcode, Packet, PacketKind, ProtocolError, Status, NO_ROOM};

/// Status token older peers write in place of a missing status.
const ABSENT_STATUS: &str = "None";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Renders a packet as one `\n`-terminated line.
pub(crate) fn encode_line(packet: &Packet) -> Result<String, ProtocolError> {
    let mut frame = Frame::new(packet.opcode());

    match &packet.kind {
        PacketKind::KeepAlive => {}
        PacketKind::Connect { username, config } => {
            frame.token("username", username)?;
            frame.count(config.len());
            for (key, value) in config {
                frame.token("config key", key)?;
                frame.text(value);
            }
        }
        PacketKind::Disconnect { username } => {
            frame.token("username", username)?;
        }
        PacketKind::Message {
            username,
            room,
            text,
        } => {
            frame.token("username", username)?;
            frame.text(text);
            frame.token("room", room)?;
        }
        PacketKind::PrivateMessage {
            username,
            recipient,
            text,
        } => {
            frame.token("username", username)?;
            frame.text(text);
            frame.token("recipient", recipient)?;
        }
        PacketKind::Broadcast {
            username,
            text,
            rooms,
        } => {
            frame.token("username", username)?;
            frame.text(text);
            frame.count(rooms.len());
            for room in rooms {
                frame.token("room", room)?;
            }
        }
        PacketKind::List { room, items } => {
            match room {
                Some(room) if room == NO_ROOM => {
                    return Err(ProtocolError::InvalidField {
                        field: "room",
                        value: room.clone(),
                    });
                }
                Some(room) => frame.token("room", room)?,
                None => frame.push(NO_ROOM),
            }
            frame.count(items.len());
            for item in items {
                frame.token("list item", item)?;
            }
        }
        PacketKind::Join { username, room }
        | PacketKind::Leave { username, room } => {
            frame.token("username", username)?;
            frame.token("room", room)?;
        }
        PacketKind::Create { room } | PacketKind::Destroy { room } => {
            frame.token("room", room)?;
        }
    }

    Ok(frame.finish(packet.status.as_ref()))
}

/// Line under construction.
struct Frame {
    line: String,
}

impl Frame {
    fn new(opcode: Opcode) -> Self {
        Self {
            line: opcode.as_str().to_owned(),
        }
    }

    fn push(&mut self, token: &str) {
        self.line.push(' ');
        self.line.push_str(token);
    }

    /// Appends a single-token field, rejecting values the decoder could
    /// not split back out.
    fn token(
        &mut self,
        field: &'static str,
        value: &str,
    ) -> Result<(), ProtocolError> {
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(ProtocolError::InvalidField {
                field,
                value: value.to_owned(),
            });
        }
        self.push(value);
        Ok(())
    }

    fn count(&mut self, n: usize) {
        self.push(&n.to_string());
    }

    /// Appends free text as `count word word ...`.
    fn text(&mut self, text: &str) {
        let words: Vec<&str> = text.split_whitespace().collect();
        self.count(words.len());
        for word in words {
            self.push(word);
        }
    }

    fn finish(mut self, status: Option<&Status>) -> String {
        match status {
            None => {}
            Some(Status::Ok) => self.push("OK"),
            Some(Status::Err(text)) => {
                self.push("ERR");
                for word in text.split_whitespace() {
                    self.push(word);
                }
            }
        }
        self.line.push('\n');
        self.line
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parses one line (with or without its trailing newline).
pub(crate) fn decode_line(line: &str) -> Result<Packet, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut tokens = Tokens::new(line);

    let opcode_token = tokens
        .next()
        .ok_or_else(|| ProtocolError::malformed("empty frame"))?;
    let opcode = Opcode::from_token(opcode_token)
        .ok_or_else(|| ProtocolError::UnknownOpcode(opcode_token.to_owned()))?;

    let kind = match opcode {
        Opcode::KeepAlive => PacketKind::KeepAlive,
        Opcode::Connect => {
            let username = tokens.field("username")?;
            let pairs = tokens.count("config pair count", 2)?;
            let mut config = std::collections::BTreeMap::new();
            for _ in 0..pairs {
                let key = tokens.field("config key")?;
                let value = tokens.text("config value")?;
                config.insert(key, value);
            }
            PacketKind::Connect { username, config }
        }
        Opcode::Disconnect => PacketKind::Disconnect {
            username: tokens.field("username")?,
        },
        Opcode::Message => {
            let username = tokens.field("username")?;
            let text = tokens.text("text")?;
            let room = tokens.field("room")?;
            PacketKind::Message {
                username,
                room,
                text,
            }
        }
        Opcode::PrivateMessage => {
            let username = tokens.field("username")?;
            let text = tokens.text("text")?;
            let recipient = tokens.field("recipient")?;
            PacketKind::PrivateMessage {
                username,
                recipient,
                text,
            }
        }
        Opcode::Broadcast => {
            let username = tokens.field("username")?;
            let text = tokens.text("text")?;
            let rooms = tokens.list("room count")?;
            PacketKind::Broadcast {
                username,
                text,
                rooms,
            }
        }
        Opcode::List => {
            let room = tokens.field("room")?;
            let items = tokens.list("item count")?;
            PacketKind::List {
                room: (room != NO_ROOM).then_some(room),
                items,
            }
        }
        Opcode::Join => PacketKind::Join {
            username: tokens.field("username")?,
            room: tokens.field("room")?,
        },
        Opcode::Leave => PacketKind::Leave {
            username: tokens.field("username")?,
            room: tokens.field("room")?,
        },
        Opcode::Create => PacketKind::Create {
            room: tokens.field("room")?,
        },
        Opcode::Destroy => PacketKind::Destroy {
            room: tokens.field("room")?,
        },
    };

    let status = tokens.status()?;
    Ok(Packet { kind, status })
}

/// Whitespace-split view of a line with a read position.
struct Tokens<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    /// Splits on the same whitespace `Frame::token` rejects, so every
    /// decoded field is one the encoder can write back out.
    fn new(line: &'a str) -> Self {
        Self {
            tokens: line.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied()?;
        self.pos += 1;
        Some(token)
    }

    fn field(&mut self, name: &str) -> Result<String, ProtocolError> {
        self.next()
            .map(str::to_owned)
            .ok_or_else(|| ProtocolError::malformed(format!("missing {name}")))
    }

    /// Reads a count whose items take at least `width` tokens each and
    /// checks that the rest of the line is long enough to hold them.
    fn count(&mut self, name: &str, width: usize) -> Result<usize, ProtocolError> {
        let token = self
            .next()
            .ok_or_else(|| ProtocolError::malformed(format!("missing {name}")))?;
        let n: usize = token.parse().map_err(|_| {
            ProtocolError::malformed(format!("{name} is not a number: {token:?}"))
        })?;
        if n.saturating_mul(width) > self.remaining() {
            return Err(ProtocolError::malformed(format!(
                "{name} {n} exceeds the {} remaining tokens",
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn take(&mut self, n: usize) -> &[&'a str] {
        let start = self.pos;
        self.pos += n;
        &self.tokens[start..self.pos]
    }

    fn text(&mut self, name: &str) -> Result<String, ProtocolError> {
        let n = self.count(name, 1)?;
        Ok(self.take(n).join(" "))
    }

    fn list(&mut self, name: &str) -> Result<Vec<String>, ProtocolError> {
        let n = self.count(name, 1)?;
        Ok(self.take(n).iter().map(|s| (*s).to_owned()).collect())
    }

    fn status(&mut self) -> Result<Option<Status>, ProtocolError> {
        match self.next() {
            None | Some(ABSENT_STATUS) => Ok(None),
            Some("OK") => Ok(Some(Status::Ok)),
            Some("ERR") => {
                let n = self.remaining();
                Ok(Some(Status::Err(self.take(n).join(" "))))
            }
            Some(other) => Err(ProtocolError::malformed(format!(
                "unexpected token {other:?} in status position"
            ))),
        }
    }
}
