//! Error types for the directory.

/// Errors returned by [`Directory`](crate::Directory) operations.
///
/// None of these are fatal. The dispatcher turns each one into an `ERR`
/// response and the server keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Another connected user already has this nick.
    #[error("user {0} already exists")]
    DuplicateNick(String),

    /// No connected user has this nick.
    #[error("user {0} does not exist")]
    UnknownUser(String),

    /// No room with this name exists.
    #[error("room {0} does not exist")]
    UnknownRoom(String),

    /// A room with this name already exists.
    #[error("room {0} already exists")]
    RoomExists(String),

    /// The user exists, the room exists, but the user hasn't joined it.
    #[error("user {nick} is not in room {room}")]
    NotInRoom { nick: String, room: String },
}
