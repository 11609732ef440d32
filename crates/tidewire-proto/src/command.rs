//! Inbound commands.
//!
//! Clients send JSON text frames tagged by `type`. Decoding happens in two
//! passes: a generic JSON parse that lets us report *which* rule a frame broke
//! (unknown name, missing field, bad channel), followed by the typed serde
//! decode. The command table ([`COMMANDS`]) is the single place that lists
//! every command name and its required fields.
//!
//! Commands never carry a sender. The hub stamps `from` with the identity
//! resolved at attach time, so any `from` a client includes is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Default upper bound on an inbound frame, in bytes.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 1024 * 1024;

/// Name used in errors when the command type cannot be determined.
const UNKNOWN: &str = "unknown";

/// A command sent by a client over its connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Join a channel
    Subscribe {
        /// Channel to join
        channel: String,
    },

    /// Leave a channel
    Unsubscribe {
        /// Channel to leave
        channel: String,
    },

    /// Send a direct message to every live connection of a user
    SendToUser {
        /// Recipient user id
        to: String,
        /// Optional text body
        #[serde(default)]
        message: Option<String>,
        /// Arbitrary structured payload
        #[serde(default)]
        data: Value,
    },

    /// Fan a message out to every member of a channel
    Broadcast {
        /// Target channel
        channel: String,
        /// Optional text body
        #[serde(default)]
        message: Option<String>,
        /// Arbitrary structured payload
        #[serde(default)]
        data: Value,
    },

    /// Tell the other members of a channel that the caller is typing
    Typing {
        /// Channel the notice is about
        channel: String,
        /// `true` when typing starts, `false` when it stops
        #[serde(default = "typing_default")]
        active: bool,
    },

    /// Ask for this connection's status and hub-wide statistics
    Status,

    /// Liveness probe
    Ping,
}

fn typing_default() -> bool {
    true
}

/// Name and required fields of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandShape {
    /// Value of the `type` tag
    pub name: &'static str,
    /// Fields that must be present and non-null
    pub required: &'static [&'static str],
}

/// Every command the hub understands, keyed by name.
pub const COMMANDS: &[CommandShape] = &[
    CommandShape { name: "subscribe", required: &["channel"] },
    CommandShape { name: "unsubscribe", required: &["channel"] },
    CommandShape { name: "sendToUser", required: &["to"] },
    CommandShape { name: "broadcast", required: &["channel"] },
    CommandShape { name: "typing", required: &["channel"] },
    CommandShape { name: "status", required: &[] },
    CommandShape { name: "ping", required: &[] },
];

/// Look up a command by its `type` tag.
pub fn shape_of(name: &str) -> Option<&'static CommandShape> {
    COMMANDS.iter().find(|shape| shape.name == name)
}

impl Command {
    /// Decode a text frame into a command.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if `text` is longer than `max_bytes`
    /// - `InvalidJson` if `text` is not JSON
    /// - `UnknownCommand` if the `type` tag names no known command
    /// - `MissingField` if `type` or a required field is absent
    /// - `InvalidChannel` if a channel name fails [`validate_channel`]
    /// - `Malformed` for any other shape mismatch
    pub fn decode(text: &str, max_bytes: usize) -> Result<Self, ProtocolError> {
        if text.len() > max_bytes {
            return Err(ProtocolError::PayloadTooLarge { size: text.len(), max: max_bytes });
        }

        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let Some(object) = value.as_object() else {
            return Err(ProtocolError::Malformed {
                command: UNKNOWN.to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        let name = match object.get("type") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(ProtocolError::Malformed {
                    command: UNKNOWN.to_string(),
                    reason: "`type` must be a string".to_string(),
                });
            },
            None => {
                return Err(ProtocolError::MissingField {
                    command: UNKNOWN.to_string(),
                    field: "type",
                });
            },
        };

        let shape = shape_of(&name).ok_or_else(|| ProtocolError::UnknownCommand(name.clone()))?;

        for &field in shape.required {
            if matches!(object.get(field), None | Some(Value::Null)) {
                return Err(ProtocolError::MissingField { command: name, field });
            }
        }

        let command: Self = serde_json::from_value(value)
            .map_err(|e| ProtocolError::Malformed { command: name, reason: e.to_string() })?;

        command.validate()?;
        Ok(command)
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Wire name (`type` tag) of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SendToUser { .. } => "sendToUser",
            Self::Broadcast { .. } => "broadcast",
            Self::Typing { .. } => "typing",
            Self::Status => "status",
            Self::Ping => "ping",
        }
    }

    /// Check field contents that serde cannot express.
    ///
    /// [`Command::decode`] runs this already; call it directly on commands
    /// built in code.
    ///
    /// # Errors
    ///
    /// - `InvalidChannel` if a channel name fails [`validate_channel`]
    /// - `MissingField` if a `sendToUser` recipient is blank
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Subscribe { channel }
            | Self::Unsubscribe { channel }
            | Self::Broadcast { channel, .. }
            | Self::Typing { channel, .. } => validate_channel(channel),
            Self::SendToUser { to, .. } => {
                if to.trim().is_empty() {
                    return Err(ProtocolError::MissingField {
                        command: self.name().to_string(),
                        field: "to",
                    });
                }
                Ok(())
            },
            Self::Status | Self::Ping => Ok(()),
        }
    }
}

/// Validate a channel name.
///
/// Names are opaque: any non-empty string is a channel. Length is bounded
/// only by the frame size limit.
pub fn validate_channel(channel: &str) -> Result<(), ProtocolError> {
    if channel.is_empty() {
        return Err(ProtocolError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCode;

    fn decode(text: &str) -> Result<Command, ProtocolError> {
        Command::decode(text, DEFAULT_MAX_COMMAND_BYTES)
    }

    #[test]
    fn decodes_every_command() {
        assert_eq!(
            decode(r#"{"type":"subscribe","channel":"lobby"}"#).unwrap(),
            Command::Subscribe { channel: "lobby".into() }
        );
        assert_eq!(
            decode(r#"{"type":"unsubscribe","channel":"lobby"}"#).unwrap(),
            Command::Unsubscribe { channel: "lobby".into() }
        );
        assert_eq!(
            decode(r#"{"type":"sendToUser","to":"u2","message":"hey","data":{"n":1}}"#).unwrap(),
            Command::SendToUser {
                to: "u2".into(),
                message: Some("hey".into()),
                data: json!({"n": 1}),
            }
        );
        assert_eq!(
            decode(r#"{"type":"broadcast","channel":"lobby","message":"hi"}"#).unwrap(),
            Command::Broadcast {
                channel: "lobby".into(),
                message: Some("hi".into()),
                data: Value::Null,
            }
        );
        assert_eq!(
            decode(r#"{"type":"typing","channel":"lobby"}"#).unwrap(),
            Command::Typing { channel: "lobby".into(), active: true }
        );
        assert_eq!(decode(r#"{"type":"status"}"#).unwrap(), Command::Status);
        assert_eq!(decode(r#"{"type":"ping"}"#).unwrap(), Command::Ping);
    }

    #[test]
    fn table_covers_every_variant() {
        let commands = [
            Command::Subscribe { channel: "c".into() },
            Command::Unsubscribe { channel: "c".into() },
            Command::SendToUser { to: "u".into(), message: None, data: Value::Null },
            Command::Broadcast { channel: "c".into(), message: None, data: Value::Null },
            Command::Typing { channel: "c".into(), active: false },
            Command::Status,
            Command::Ping,
        ];
        assert_eq!(commands.len(), COMMANDS.len());
        for command in &commands {
            assert!(shape_of(command.name()).is_some(), "{} missing from table", command.name());
        }
    }

    #[test]
    fn sender_field_is_ignored() {
        let command =
            decode(r#"{"type":"broadcast","channel":"lobby","message":"hi","from":"admin"}"#)
                .unwrap();
        let encoded = command.encode().unwrap();
        assert!(!encoded.contains("admin"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidJson);
    }

    #[test]
    fn rejects_non_object() {
        let err = decode("[1,2,3]").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Malformed);
    }

    #[test]
    fn rejects_missing_type() {
        let err = decode(r#"{"channel":"lobby"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField { command: "unknown".into(), field: "type" });
    }

    #[test]
    fn rejects_unknown_type() {
        let err = decode(r#"{"type":"teleport"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand("teleport".into()));
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = decode(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField { command: "subscribe".into(), field: "channel" }
        );

        let err = decode(r#"{"type":"sendToUser","to":null}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField { command: "sendToUser".into(), field: "to" });
    }

    #[test]
    fn rejects_blank_recipient() {
        let err = decode(r#"{"type":"sendToUser","to":"   "}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingField);
    }

    #[test]
    fn rejects_wrong_field_type() {
        let err = decode(r#"{"type":"subscribe","channel":42}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Malformed);
        assert_eq!(err.command(), Some("subscribe"));
    }

    #[test]
    fn rejects_empty_channel_name() {
        let err = decode(r#"{"type":"subscribe","channel":""}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidChannel(String::new()));
    }

    #[test]
    fn channel_names_are_opaque() {
        let long = "x".repeat(129);
        for name in ["   ", "tab\there", "line\nbreak", "üñï/côdé", long.as_str()] {
            let text = json!({"type": "subscribe", "channel": name}).to_string();
            assert_eq!(decode(&text).unwrap(), Command::Subscribe { channel: name.into() });
        }
    }

    #[test]
    fn rejects_oversized_frame() {
        let text = r#"{"type":"ping"}"#;
        let err = Command::decode(text, 4).unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLarge { size: text.len(), max: 4 });
    }
}
