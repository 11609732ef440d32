//! Outbound events.
//!
//! Every event is sent as `{"event": <name>, "data": {...}}` with camelCase
//! payload keys. The event names and payload shapes are a stable contract
//! with clients; additions are fine, renames are not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, ProtocolError};

/// An event pushed to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    /// Sent once to the caller after attach
    Connected(Connected),
    /// Reply to `subscribe`
    Subscribed(ChannelAck),
    /// Reply to `unsubscribe`
    Unsubscribed(ChannelAck),
    /// User-targeted message
    Message(DirectMessage),
    /// Channel-targeted message
    Broadcast(ChannelMessage),
    /// Typing notice relayed to channel members
    Typing(TypingNotice),
    /// A user came online or went offline
    Presence(PresenceNotice),
    /// Another connection joined or left a channel the recipient is in
    Membership(MembershipNotice),
    /// Reply to `ping`
    Pong(Pong),
    /// Reply to `status`
    Status(StatusReport),
    /// Caller error reply
    Error(ErrorReply),
}

impl Event {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Subscribed(_) => "subscribed",
            Self::Unsubscribed(_) => "unsubscribed",
            Self::Message(_) => "message",
            Self::Broadcast(_) => "broadcast",
            Self::Typing(_) => "typing",
            Self::Presence(_) => "presence",
            Self::Membership(_) => "membership",
            Self::Pong(_) => "pong",
            Self::Status(_) => "status",
            Self::Error(_) => "error",
        }
    }

    /// Timestamp carried by the payload.
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Connected(e) => &e.timestamp,
            Self::Subscribed(e) | Self::Unsubscribed(e) => &e.timestamp,
            Self::Message(e) => &e.timestamp,
            Self::Broadcast(e) => &e.timestamp,
            Self::Typing(e) => &e.timestamp,
            Self::Presence(e) => &e.timestamp,
            Self::Membership(e) => &e.timestamp,
            Self::Pong(e) => &e.timestamp,
            Self::Status(e) => &e.timestamp,
            Self::Error(e) => &e.timestamp,
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a JSON text frame (client side and tests).
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

/// Payload of `connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    /// Id assigned to the new connection
    pub connection_id: String,
    /// Identity the connection is attached as
    pub user_id: String,
    /// When the attach completed
    pub timestamp: String,
}

/// Payload of `subscribed` and `unsubscribed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAck {
    /// Channel the acknowledgement refers to
    pub channel: String,
    /// When the membership change was applied
    pub timestamp: String,
}

/// Payload of `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    /// Sending user, stamped by the hub
    pub from: String,
    /// Recipient user
    pub to: String,
    /// Optional text body
    pub message: Option<String>,
    /// Arbitrary structured payload
    pub data: Value,
    /// When the hub routed the message
    pub timestamp: String,
}

/// Payload of `broadcast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// Sending user, stamped by the hub
    pub from: String,
    /// Channel the message was sent to
    pub channel: String,
    /// Optional text body
    pub message: Option<String>,
    /// Arbitrary structured payload
    pub data: Value,
    /// When the hub routed the message
    pub timestamp: String,
}

/// Payload of `typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// User who is typing
    pub from: String,
    /// Channel they are typing in
    pub channel: String,
    /// Whether typing started or stopped
    pub active: bool,
    /// When the notice was relayed
    pub timestamp: String,
}

/// Presence transitions announced to other connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    /// First live connection of the user attached
    Online,
    /// Last live connection of the user detached
    Offline,
}

/// Payload of `presence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    /// User whose presence changed
    pub user_id: String,
    /// New presence
    pub status: PresenceStatus,
    /// When the change happened
    pub timestamp: String,
}

/// Direction of a channel membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipStatus {
    /// Connection joined the channel
    Joined,
    /// Connection left the channel, by unsubscribing or disconnecting
    Left,
}

/// Payload of `membership`.
///
/// Sent to the other members of the channel, never to the connection that
/// joined or left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipNotice {
    /// User owning the connection that joined or left
    pub user_id: String,
    /// Channel whose membership changed
    pub channel: String,
    /// What happened
    pub status: MembershipStatus,
    /// When the change was applied
    pub timestamp: String,
}

/// Payload of `pong`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    /// When the hub answered
    pub timestamp: String,
}

/// Hub-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Connections attached since start
    pub total_connections: u64,
    /// Connections currently attached
    pub active_connections: u64,
    /// Users with at least one live connection
    pub active_users: u64,
    /// Channels with at least one member
    pub active_channels: u64,
    /// Routing requests handled by the router
    pub messages_routed: u64,
    /// Events enqueued on a live connection
    pub deliveries: u64,
    /// Recipients skipped because their transport was already gone
    pub deliveries_skipped: u64,
    /// Recipients whose outbound queue refused the event
    pub deliveries_dropped: u64,
    /// Commands answered with an `error` event
    pub caller_errors: u64,
}

/// Payload of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Caller's connection id
    pub connection_id: String,
    /// Caller's user id
    pub user_id: String,
    /// Channels the caller's connection has joined, sorted
    pub channels: Vec<String>,
    /// Hub-wide counters
    pub stats: HubStats,
    /// When the report was taken
    pub timestamp: String,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable description
    pub message: String,
    /// Command the error relates to, when known
    pub command: Option<String>,
    /// When the error was reported
    pub timestamp: String,
}

impl ErrorReply {
    /// Build a reply from a decoding failure.
    pub fn from_protocol(err: &ProtocolError, timestamp: String) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            command: err.command().map(str::to_string),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const TS: &str = "2026-01-01T00:00:00.000Z";

    #[test]
    fn names_match_serialized_tags() {
        let events = [
            Event::Connected(Connected {
                connection_id: "c1".into(),
                user_id: "u1".into(),
                timestamp: TS.into(),
            }),
            Event::Subscribed(ChannelAck { channel: "lobby".into(), timestamp: TS.into() }),
            Event::Unsubscribed(ChannelAck { channel: "lobby".into(), timestamp: TS.into() }),
            Event::Pong(Pong { timestamp: TS.into() }),
            Event::Presence(PresenceNotice {
                user_id: "u1".into(),
                status: PresenceStatus::Offline,
                timestamp: TS.into(),
            }),
            Event::Membership(MembershipNotice {
                user_id: "u1".into(),
                channel: "lobby".into(),
                status: MembershipStatus::Left,
                timestamp: TS.into(),
            }),
        ];

        for event in events {
            let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
            assert_eq!(value["event"], event.name());
            assert_eq!(value["data"]["timestamp"], TS);
        }
    }

    #[test]
    fn message_payload_uses_contract_keys() {
        let event = Event::Message(DirectMessage {
            from: "u1".into(),
            to: "u2".into(),
            message: Some("hello".into()),
            data: json!({"k": "v"}),
            timestamp: TS.into(),
        });

        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "message",
                "data": {
                    "from": "u1",
                    "to": "u2",
                    "message": "hello",
                    "data": {"k": "v"},
                    "timestamp": TS,
                }
            })
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let event = Event::Error(ErrorReply {
            code: ErrorCode::UnknownCommand,
            message: "unknown command type: jump".into(),
            command: Some("jump".into()),
            timestamp: TS.into(),
        });
        assert_eq!(Event::decode(&event.encode().unwrap()).unwrap(), event);
    }

    #[test]
    fn error_reply_from_protocol_error() {
        let err = ProtocolError::MissingField { command: "subscribe".into(), field: "channel" };
        let reply = ErrorReply::from_protocol(&err, TS.into());
        assert_eq!(reply.code, ErrorCode::MissingField);
        assert_eq!(reply.command.as_deref(), Some("subscribe"));
        assert!(reply.message.contains("channel"));
    }
}
