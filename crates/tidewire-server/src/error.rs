//! Server error types.

use std::fmt;

use tidewire_core::SessionError;
use tokio_tungstenite::tungstenite;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, zero heartbeat, etc.).
    ///
    /// Fatal. Prevents server startup.
    Config(String),

    /// Transport/network error (bind failure, socket I/O, WebSocket protocol).
    ///
    /// Fatal for the affected connection; the listener keeps serving others.
    Transport(String),

    /// The upgrade request carried no usable identity.
    ///
    /// The peer has already been answered with HTTP 401.
    Unauthorized,

    /// Session error surfaced by the hub core.
    ///
    /// Only fatal session errors (registry corruption, idle timeout) end a
    /// connection task with this variant.
    Session(SessionError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Unauthorized => f.write_str("upgrade rejected: missing user identity"),
            Self::Session(err) => write!(f, "session error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for ServerError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tungstenite::Error> for ServerError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
