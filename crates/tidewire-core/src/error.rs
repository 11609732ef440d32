//! Error types for the hub core.
//!
//! Strongly-typed errors per layer: registry corruption (fatal), session
//! lifecycle misuse, and transport refusals. Caller errors (bad commands) are
//! not errors at this level; sessions answer them with an `error` event.

use std::time::Duration;

use thiserror::Error;

use crate::{ids::ConnectionId, session::SessionState};

/// Errors raised by the connection and channel registries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Internal indexes disagree with each other
    ///
    /// Never repaired silently. The connection task that observes this should
    /// log it and tear down.
    #[error("{registry} registry corrupted: {detail}")]
    Corrupted {
        /// Which registry detected the problem
        registry: &'static str,
        /// What disagreed
        detail: String,
    },

    /// Connection has no membership slot (never attached, or already left)
    #[error("connection {0} is not enrolled")]
    NotEnrolled(ConnectionId),
}

/// Errors from driving a [`HubSession`](crate::session::HubSession).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Command arrived before `attach`
    #[error("session is not attached")]
    NotAttached,

    /// Command arrived after `detach`
    #[error("session {0} is already detached")]
    Stale(ConnectionId),

    /// Lifecycle operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// No inbound activity within the configured idle timeout
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long the session was idle
        elapsed: Duration,
    },

    /// Registry failure surfaced through the session
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SessionError {
    /// Returns true if the connection must be torn down.
    ///
    /// Lifecycle misuse (`NotAttached`, `Stale`, `InvalidState`) is benign and
    /// leaves the connection alone.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IdleTimeout { .. } | Self::Registry(_))
    }
}

/// Reasons an outbound enqueue was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Outbound queue is at capacity (slow consumer)
    #[error("outbound queue full")]
    Full,

    /// Receiving side is gone
    #[error("transport closed")]
    Closed,
}
