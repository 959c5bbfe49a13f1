//! Unified error type for the Parley server.

use parley_directory::DirectoryError;
use parley_protocol::ProtocolError;
use parley_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each wrapping variant lets `?` convert sub-crate errors
/// without ceremony.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (bind, accept, send, recv, push).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame that could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A directory operation failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The server hung up before answering a request.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// The server answered a request with `ERR`.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// No free port could be found for the client's callback listener.
    #[error("no callback port available after {0} attempts")]
    CallbackUnavailable(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::FrameTooLong(10);
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Transport(_)));
        assert!(parley_err.to_string().contains("10"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownOpcode("HELLO".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Protocol(_)));
        assert!(parley_err.to_string().contains("HELLO"));
    }

    #[test]
    fn test_from_directory_error() {
        let err = DirectoryError::UnknownRoom("lobby".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Directory(_)));
        assert_eq!(parley_err.to_string(), "room lobby does not exist");
    }

    #[test]
    fn test_rejected_display() {
        let err = ParleyError::Rejected("user already exists".into());
        assert_eq!(err.to_string(), "request rejected: user already exists");
    }
}
