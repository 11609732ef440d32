//! Wire contract for the tidewire hub.
//!
//! Clients and the hub exchange JSON text frames:
//!
//! - inbound [`Command`]s, tagged by `type` (`subscribe`, `sendToUser`, ...)
//! - outbound [`Event`]s, shaped `{"event": <name>, "data": {...}}`
//!
//! This crate is pure data: no I/O, no hub state. Decoding reports precise
//! [`ProtocolError`]s so the hub can answer malformed frames with a structured
//! `error` event instead of dropping the connection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod event;
pub mod time;

pub use command::{
    COMMANDS, Command, CommandShape, DEFAULT_MAX_COMMAND_BYTES, shape_of, validate_channel,
};
pub use error::{ErrorCode, ProtocolError};
pub use event::{
    ChannelAck, ChannelMessage, Connected, DirectMessage, ErrorReply, Event, HubStats,
    MembershipNotice, MembershipStatus, Pong, PresenceNotice, PresenceStatus, StatusReport,
    TypingNotice,
};
pub use time::{format_timestamp, parse_timestamp};
