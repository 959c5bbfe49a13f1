//! Codec trait and implementations for turning packets into frames.
//!
//! A codec converts a [`Packet`] into exactly one `\n`-terminated frame and
//! back. The server and the fan-out messenger are generic over [`Codec`],
//! so the wire format can be swapped without touching them.
//!
//! [`LineCodec`] is the real protocol. [`JsonCodec`] puts the same packets
//! on the wire as one JSON object per line, which is handy when you want
//! to read traffic in a log.

use crate::line::{decode_line, encode_line};
use crate::{Packet, ProtocolError};

/// Encodes packets to frames and decodes frames back to packets.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task and every delivery task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a packet into a single newline-terminated frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidField`] if a field can't be
    /// represented in this format.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one frame. A trailing `\n` (or `\r\n`) is optional.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownOpcode`] or
    /// [`ProtocolError::MalformedPacket`] for frames that don't parse.
    fn decode(&self, frame: &[u8]) -> Result<Packet, ProtocolError>;
}

// ---------------------------------------------------------------------------
// LineCodec
// ---------------------------------------------------------------------------

/// The Parley text protocol.
///
/// ```rust
/// use parley_protocol::{Codec, LineCodec, Packet};
///
/// let codec = LineCodec;
/// let bytes = codec.encode(&Packet::message("ann", "lobby", "hi there")).unwrap();
/// assert_eq!(bytes, b"MSG ann 2 hi there lobby\n");
///
/// let decoded = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Packet::message("ann", "lobby", "hi there"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Codec for LineCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        encode_line(packet).map(String::into_bytes)
    }

    fn decode(&self, frame: &[u8]) -> Result<Packet, ProtocolError> {
        let line = std::str::from_utf8(frame).map_err(|e| {
            ProtocolError::MalformedPacket(format!("frame is not UTF-8: {e}"))
        })?;
        decode_line(line)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that writes each packet as a JSON object on its own line.
///
/// `serde_json` escapes embedded newlines, so one packet is always one
/// line and the same line-oriented transport carries it.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = serde_json::to_vec(packet).map_err(ProtocolError::Encode)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, frame: &[u8]) -> Result<Packet, ProtocolError> {
        let trimmed = frame
            .strip_suffix(b"\n")
            .unwrap_or(frame);
        let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
        serde_json::from_slice(trimmed).map_err(ProtocolError::Decode)
    }
}
