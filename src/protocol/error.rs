use thiserror::Error;

/// Protocol parsing errors.
///
/// Framing errors are fatal: the server closes the socket without
/// replying. `InvalidUtf8` inside a complete query-phase frame is the one
/// exception; the codec turns it into [`FrontendMessage::InvalidEncoding`]
/// so the session can answer it and continue.
///
/// [`FrontendMessage::InvalidEncoding`]: crate::protocol::FrontendMessage::InvalidEncoding
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message length: {0}")]
    InvalidLength(i32),
    #[error("invalid message")]
    InvalidMessage,
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(i32),
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
