//! Fuzz target for hub state under arbitrary session traffic
//!
//! # Strategy
//!
//! A small pool of simulated clients attaches, subscribes, broadcasts, sends
//! and detaches in whatever order the fuzzer picks, including raw text frames
//! and commands on detached sessions.
//!
//! # Invariants
//!
//! - Registry indexes always agree with each other
//! - No channel lists a connection that is not attached
//! - Once every client detaches the hub is empty

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidewire_core::{Hub, HubConfig};
use tidewire_harness::{HubSnapshot, InvariantRegistry, SimClient, SimEnv};

const CLIENTS: usize = 4;
const CHANNELS: [&str; 3] = ["lobby", "ops", "random"];

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    echo: bool,
    require_membership: bool,
    announce_membership: bool,
    ops: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Attach { client: u8, user: u8 },
    Subscribe { client: u8, channel: u8 },
    Unsubscribe { client: u8, channel: u8 },
    Broadcast { client: u8, channel: u8 },
    SendToUser { client: u8, user: u8 },
    Raw { client: u8, text: String },
    Detach { client: u8 },
}

fn channel(n: u8) -> &'static str {
    CHANNELS[n as usize % CHANNELS.len()]
}

fuzz_target!(|scenario: Scenario| {
    let hub = Hub::shared(HubConfig {
        echo_broadcasts: scenario.echo,
        broadcast_requires_membership: scenario.require_membership,
        announce_membership: scenario.announce_membership,
        ..HubConfig::default()
    });
    let env = SimEnv::with_seed(scenario.seed);
    let mut clients: Vec<SimClient> =
        (0..CLIENTS).map(|_| SimClient::open(&hub, &env, 8)).collect();
    let invariants = InvariantRegistry::standard();

    for op in scenario.ops.into_iter().take(256) {
        // Session errors (not attached, stale) are expected; only invariants matter.
        match op {
            Op::Attach { client, user } => {
                let _ = clients[client as usize % CLIENTS].attach(&format!("u{}", user % 3));
            },
            Op::Subscribe { client, channel: ch } => {
                let _ = clients[client as usize % CLIENTS].subscribe(channel(ch));
            },
            Op::Unsubscribe { client, channel: ch } => {
                let text = format!(r#"{{"type":"unsubscribe","channel":"{}"}}"#, channel(ch));
                let _ = clients[client as usize % CLIENTS].send_text(&text);
            },
            Op::Broadcast { client, channel: ch } => {
                let _ = clients[client as usize % CLIENTS].broadcast(channel(ch), "x");
            },
            Op::SendToUser { client, user } => {
                let to = format!("u{}", user % 3);
                let _ = clients[client as usize % CLIENTS].send_to_user(&to, "x");
            },
            Op::Raw { client, text } => {
                let _ = clients[client as usize % CLIENTS].send_text(&text);
            },
            Op::Detach { client } => {
                let _ = clients[client as usize % CLIENTS].disconnect();
            },
        }

        for client in &mut clients {
            client.drain();
        }
        invariants.assert_all(&HubSnapshot::from_hub(&hub), "during sequence");
        assert!(hub.check_consistency().is_ok());
    }

    for client in &mut clients {
        let _ = client.disconnect();
    }
    let snapshot = HubSnapshot::from_hub(&hub);
    invariants.assert_all(&snapshot, "after teardown");
    assert!(snapshot.connections.is_empty());
    assert!(snapshot.channels.is_empty());
});
