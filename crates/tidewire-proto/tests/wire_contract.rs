//! Wire contract snapshots.
//!
//! Clients parse these shapes directly, so any change to an event name or a
//! payload key shows up here as a snapshot diff.

use insta::assert_json_snapshot;
use serde_json::json;
use tidewire_proto::{
    ChannelAck, ChannelMessage, Connected, DirectMessage, ErrorCode, ErrorReply, Event, HubStats,
    MembershipNotice, MembershipStatus, Pong, PresenceNotice, PresenceStatus, StatusReport,
    TypingNotice,
};

const TS: &str = "2026-03-01T12:00:00.000Z";

#[test]
fn connected_event() {
    let event = Event::Connected(Connected {
        connection_id: "9f2c41d07ab3e865".into(),
        user_id: "u1".into(),
        timestamp: TS.into(),
    });

    assert_json_snapshot!(event, @r#"
    {
      "event": "connected",
      "data": {
        "connectionId": "9f2c41d07ab3e865",
        "userId": "u1",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn subscribed_and_unsubscribed_events() {
    let ack = ChannelAck { channel: "lobby".into(), timestamp: TS.into() };

    assert_json_snapshot!(Event::Subscribed(ack.clone()), @r#"
    {
      "event": "subscribed",
      "data": {
        "channel": "lobby",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);

    assert_json_snapshot!(Event::Unsubscribed(ack), @r#"
    {
      "event": "unsubscribed",
      "data": {
        "channel": "lobby",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn message_event() {
    let event = Event::Message(DirectMessage {
        from: "u1".into(),
        to: "u2".into(),
        message: None,
        data: json!({"draftId": 7}),
        timestamp: TS.into(),
    });

    assert_json_snapshot!(event, @r#"
    {
      "event": "message",
      "data": {
        "from": "u1",
        "to": "u2",
        "message": null,
        "data": {
          "draftId": 7
        },
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn broadcast_event() {
    let event = Event::Broadcast(ChannelMessage {
        from: "u1".into(),
        channel: "lobby".into(),
        message: Some("hi".into()),
        data: serde_json::Value::Null,
        timestamp: TS.into(),
    });

    assert_json_snapshot!(event, @r#"
    {
      "event": "broadcast",
      "data": {
        "from": "u1",
        "channel": "lobby",
        "message": "hi",
        "data": null,
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn typing_and_presence_events() {
    let typing = Event::Typing(TypingNotice {
        from: "u2".into(),
        channel: "lobby".into(),
        active: false,
        timestamp: TS.into(),
    });

    assert_json_snapshot!(typing, @r#"
    {
      "event": "typing",
      "data": {
        "from": "u2",
        "channel": "lobby",
        "active": false,
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);

    let presence = Event::Presence(PresenceNotice {
        user_id: "u2".into(),
        status: PresenceStatus::Online,
        timestamp: TS.into(),
    });

    assert_json_snapshot!(presence, @r#"
    {
      "event": "presence",
      "data": {
        "userId": "u2",
        "status": "online",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn membership_event() {
    let joined = Event::Membership(MembershipNotice {
        user_id: "u3".into(),
        channel: "lobby".into(),
        status: MembershipStatus::Joined,
        timestamp: TS.into(),
    });

    assert_json_snapshot!(joined, @r#"
    {
      "event": "membership",
      "data": {
        "userId": "u3",
        "channel": "lobby",
        "status": "joined",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn pong_event() {
    assert_json_snapshot!(Event::Pong(Pong { timestamp: TS.into() }), @r#"
    {
      "event": "pong",
      "data": {
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn status_event() {
    let event = Event::Status(StatusReport {
        connection_id: "c1".into(),
        user_id: "u1".into(),
        channels: vec!["alpha".into(), "lobby".into()],
        stats: HubStats {
            total_connections: 3,
            active_connections: 2,
            active_users: 2,
            active_channels: 2,
            messages_routed: 10,
            deliveries: 14,
            deliveries_skipped: 1,
            deliveries_dropped: 0,
            caller_errors: 2,
        },
        timestamp: TS.into(),
    });

    assert_json_snapshot!(event, @r#"
    {
      "event": "status",
      "data": {
        "connectionId": "c1",
        "userId": "u1",
        "channels": [
          "alpha",
          "lobby"
        ],
        "stats": {
          "totalConnections": 3,
          "activeConnections": 2,
          "activeUsers": 2,
          "activeChannels": 2,
          "messagesRouted": 10,
          "deliveries": 14,
          "deliveriesSkipped": 1,
          "deliveriesDropped": 0,
          "callerErrors": 2
        },
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}

#[test]
fn error_event() {
    let event = Event::Error(ErrorReply {
        code: ErrorCode::MissingField,
        message: "missing field `channel` in subscribe command".into(),
        command: Some("subscribe".into()),
        timestamp: TS.into(),
    });

    assert_json_snapshot!(event, @r#"
    {
      "event": "error",
      "data": {
        "code": "missingField",
        "message": "missing field `channel` in subscribe command",
        "command": "subscribe",
        "timestamp": "2026-03-01T12:00:00.000Z"
      }
    }
    "#);
}
