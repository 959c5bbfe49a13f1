//! Error types for the protocol layer.
//!
//! Every crate in Parley defines its own error enum. A `ProtocolError`
//! always means the bytes on the wire were wrong (or a packet could not be
//! put on the wire), never that a room or user was missing.

/// Errors that can occur while encoding or decoding packets.
///
/// The server treats all of these as connection-level failures: the
/// offending connection is closed without a reply.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The first token of the frame is not a known opcode name.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    /// The frame is structurally broken: empty, truncated, a token count
    /// that runs past the end of the line, or an unknown status token.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A packet field cannot be represented on the wire.
    ///
    /// Single-token fields (nicks, room names, config keys) must be
    /// non-empty and free of whitespace, otherwise the decoder on the
    /// other side would split them apart.
    #[error("invalid {field}: {value:?}")]
    InvalidField {
        /// Which field was rejected (`"username"`, `"room"`, ...).
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket(reason.into())
    }
}
