//! Protocol error types.
//!
//! Decoding failures are caller errors: the hub answers them with an `error`
//! event on the offending connection and keeps the session alive. Each
//! variant maps onto a stable [`ErrorCode`] that clients can match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes carried in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Frame was not valid JSON
    InvalidJson,
    /// JSON was valid but did not have the shape of a command
    Malformed,
    /// `type` named a command the hub does not know
    UnknownCommand,
    /// A required field was absent or empty
    MissingField,
    /// Channel name failed validation
    InvalidChannel,
    /// Frame exceeded the configured size limit
    PayloadTooLarge,
    /// Frame kind is not accepted (e.g. binary frames)
    UnsupportedFrame,
    /// Connection already holds the maximum number of subscriptions
    SubscriptionLimit,
    /// Broadcast to a channel the caller has not joined
    NotSubscribed,
    /// Hub-side failure while handling the command
    Internal,
}

impl ErrorCode {
    /// Wire name of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalidJson",
            Self::Malformed => "malformed",
            Self::UnknownCommand => "unknownCommand",
            Self::MissingField => "missingField",
            Self::InvalidChannel => "invalidChannel",
            Self::PayloadTooLarge => "payloadTooLarge",
            Self::UnsupportedFrame => "unsupportedFrame",
            Self::SubscriptionLimit => "subscriptionLimit",
            Self::NotSubscribed => "notSubscribed",
            Self::Internal => "internal",
        }
    }
}

/// Errors produced while decoding inbound commands or encoding events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input was not parseable JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON did not match the expected command shape
    #[error("malformed {command} command: {reason}")]
    Malformed {
        /// Command name, or `"unknown"` if the type tag was unreadable
        command: String,
        /// Human-readable description of the mismatch
        reason: String,
    },

    /// Command type tag is not recognized
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// Required field missing or empty
    #[error("missing field `{field}` in {command} command")]
    MissingField {
        /// Command name (`"unknown"` when the type tag itself is missing)
        command: String,
        /// Name of the missing field
        field: &'static str,
    },

    /// Channel name is empty, too long, or contains control characters
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// Frame larger than the configured limit
    #[error("payload too large: {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Observed size in bytes
        size: usize,
        /// Configured maximum in bytes
        max: usize,
    },

    /// Event could not be serialized
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Error code reported to the caller for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidJson(_) => ErrorCode::InvalidJson,
            Self::Malformed { .. } => ErrorCode::Malformed,
            Self::UnknownCommand(_) => ErrorCode::UnknownCommand,
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::InvalidChannel(_) => ErrorCode::InvalidChannel,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            Self::Encode(_) => ErrorCode::Internal,
        }
    }

    /// Command name the error relates to, when one could be determined.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Malformed { command, .. } | Self::MissingField { command, .. } => {
                Some(command.as_str())
            },
            Self::UnknownCommand(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_names() {
        for code in [
            ErrorCode::InvalidJson,
            ErrorCode::Malformed,
            ErrorCode::UnknownCommand,
            ErrorCode::MissingField,
            ErrorCode::InvalidChannel,
            ErrorCode::PayloadTooLarge,
            ErrorCode::UnsupportedFrame,
            ErrorCode::SubscriptionLimit,
            ErrorCode::NotSubscribed,
            ErrorCode::Internal,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::MissingField { command: "subscribe".into(), field: "channel" };
        assert_eq!(err.to_string(), "missing field `channel` in subscribe command");

        let err = ProtocolError::PayloadTooLarge { size: 10, max: 4 };
        assert_eq!(err.to_string(), "payload too large: 10 bytes exceeds limit of 4");
    }

    #[test]
    fn command_name_is_exposed_where_known() {
        assert_eq!(ProtocolError::UnknownCommand("jump".into()).command(), Some("jump"));
        assert_eq!(ProtocolError::InvalidJson("eof".into()).command(), None);
    }
}
