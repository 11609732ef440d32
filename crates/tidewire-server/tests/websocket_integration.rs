//! End-to-end tests over a real loopback WebSocket.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tidewire_core::Hub;
use tidewire_server::{Server, ServerRuntimeConfig};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message, client::IntoClientRequest, http::HeaderValue},
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start(config: ServerRuntimeConfig) -> (SocketAddr, Arc<Hub>) {
    let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..config };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let hub = Arc::clone(server.hub());
    tokio::spawn(server.run());
    (addr, hub)
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request.headers_mut().insert("x-user-id", HeaderValue::from_str(user).unwrap());
    let (mut ws, _) = connect_async(request).await.unwrap();

    let connected = next_event(&mut ws).await;
    assert_eq!(connected["event"], "connected");
    assert_eq!(connected["data"]["userId"], user);
    ws
}

async fn send(ws: &mut Client, command: Value) {
    ws.send(Message::Text(command.to_string().into())).await.unwrap();
}

/// Next JSON event, skipping control frames.
async fn next_event(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Next event named `name`, skipping others (presence, acks).
async fn next_named(ws: &mut Client, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event;
        }
    }
}

async fn wait_for_connections(hub: &Hub, expected: u64) {
    tokio::time::timeout(WAIT, async {
        while hub.stats().active_connections != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn broadcast_reaches_other_member_without_echo() {
    let (addr, _hub) = start(ServerRuntimeConfig::default()).await;
    let mut alice = connect(addr, "u1").await;
    let mut bob = connect(addr, "u2").await;

    for ws in [&mut alice, &mut bob] {
        send(ws, json!({"type": "subscribe", "channel": "lobby"})).await;
        let ack = next_named(ws, "subscribed").await;
        assert_eq!(ack["data"]["channel"], "lobby");
    }

    send(&mut alice, json!({"type": "broadcast", "channel": "lobby", "message": "hi"})).await;

    let received = next_named(&mut bob, "broadcast").await;
    assert_eq!(received["data"]["from"], "u1");
    assert_eq!(received["data"]["channel"], "lobby");
    assert_eq!(received["data"]["message"], "hi");

    // Alice's next event is her own pong, not an echo of the broadcast.
    send(&mut alice, json!({"type": "ping"})).await;
    let next = next_event(&mut alice).await;
    assert_eq!(next["event"], "pong");
}

#[tokio::test]
async fn send_to_user_reaches_every_device() {
    let (addr, _hub) = start(ServerRuntimeConfig::default()).await;
    let mut phone = connect(addr, "alice").await;
    let mut laptop = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;

    send(&mut bob, json!({"type": "sendToUser", "to": "alice", "message": "yo"})).await;

    for device in [&mut phone, &mut laptop] {
        let message = next_named(device, "message").await;
        assert_eq!(message["data"]["from"], "bob");
        assert_eq!(message["data"]["to"], "alice");
        assert_eq!(message["data"]["message"], "yo");
    }
}

#[tokio::test]
async fn malformed_frames_get_error_replies() {
    let config = ServerRuntimeConfig { max_message_bytes: 64, ..Default::default() };
    let (addr, _hub) = start(config).await;
    let mut ws = connect(addr, "u1").await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let error = next_named(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "invalidJson");

    send(&mut ws, json!({"type": "teleport"})).await;
    let error = next_named(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "unknownCommand");

    let big = json!({"type": "broadcast", "channel": "c", "message": "x".repeat(100)});
    send(&mut ws, big).await;
    let error = next_named(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "payloadTooLarge");

    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    let error = next_named(&mut ws, "error").await;
    assert_eq!(error["data"]["code"], "unsupportedFrame");

    // Still attached afterwards.
    send(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(next_named(&mut ws, "pong").await["event"], "pong");
}

#[tokio::test]
async fn upgrade_without_identity_is_unauthorized() {
    let (addr, hub) = start(ServerRuntimeConfig::default()).await;

    let result = connect_async(format!("ws://{addr}/")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }
    assert_eq!(hub.stats().total_connections, 0);
}

#[tokio::test]
async fn query_parameter_identity_is_accepted() {
    let (addr, _hub) = start(ServerRuntimeConfig::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/?user=carol")).await.unwrap();
    let connected = next_event(&mut ws).await;
    assert_eq!(connected["data"]["userId"], "carol");
}

#[tokio::test]
async fn closing_socket_detaches_and_prunes() {
    let (addr, hub) = start(ServerRuntimeConfig::default()).await;
    let mut ws = connect(addr, "u1").await;
    send(&mut ws, json!({"type": "subscribe", "channel": "lobby"})).await;
    next_named(&mut ws, "subscribed").await;
    assert_eq!(hub.stats().active_channels, 1);

    ws.close(None).await.unwrap();
    wait_for_connections(&hub, 0).await;

    let stats = hub.stats();
    assert_eq!(stats.active_users, 0);
    assert_eq!(stats.active_channels, 0);
    hub.check_consistency().unwrap();
}

#[tokio::test]
async fn presence_announced_to_others() {
    let (addr, _hub) = start(ServerRuntimeConfig::default()).await;
    let mut watcher = connect(addr, "watcher").await;
    let mut dave = connect(addr, "dave").await;

    let online = next_named(&mut watcher, "presence").await;
    assert_eq!(online["data"]["userId"], "dave");
    assert_eq!(online["data"]["status"], "online");

    dave.close(None).await.unwrap();
    let offline = next_named(&mut watcher, "presence").await;
    assert_eq!(offline["data"]["userId"], "dave");
    assert_eq!(offline["data"]["status"], "offline");
}
