//! Tidewire server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port, identity from the x-user-id header
//! tidewire-server --bind 0.0.0.0:8080
//!
//! # Behind a proxy that forwards the user in another header
//! TIDEWIRE_IDENTITY_HEADER=x-forwarded-user tidewire-server
//! ```

use std::time::Duration;

use clap::Parser;
use tidewire_core::{DEFAULT_MAX_SUBSCRIPTIONS, HubConfig};
use tidewire_proto::DEFAULT_MAX_COMMAND_BYTES;
use tidewire_server::{
    DEFAULT_IDENTITY_HEADER, DEFAULT_OUTBOUND_QUEUE, Server, ServerRuntimeConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tidewire real-time hub server
#[derive(Parser, Debug)]
#[command(name = "tidewire-server")]
#[command(about = "Real-time connection and channel pub/sub hub")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "TIDEWIRE_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Header carrying the authenticated user id
    #[arg(long, env = "TIDEWIRE_IDENTITY_HEADER", default_value = DEFAULT_IDENTITY_HEADER)]
    identity_header: String,

    /// Events buffered per connection before pushes are dropped
    #[arg(long, env = "TIDEWIRE_QUEUE_CAPACITY", default_value_t = DEFAULT_OUTBOUND_QUEUE)]
    queue_capacity: usize,

    /// Largest accepted inbound text frame, in bytes
    #[arg(long, env = "TIDEWIRE_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_COMMAND_BYTES)]
    max_message_bytes: usize,

    /// Seconds between heartbeat pings
    #[arg(long, env = "TIDEWIRE_HEARTBEAT_SECS", default_value = "20")]
    heartbeat_secs: u64,

    /// Seconds without inbound traffic before a connection is closed
    #[arg(long, env = "TIDEWIRE_IDLE_TIMEOUT_SECS", default_value = "60")]
    idle_timeout_secs: u64,

    /// Channels a single connection may join
    #[arg(long, env = "TIDEWIRE_MAX_SUBSCRIPTIONS", default_value_t = DEFAULT_MAX_SUBSCRIPTIONS)]
    max_subscriptions: usize,

    /// Deliver broadcasts back to the sending connection
    #[arg(long, env = "TIDEWIRE_ECHO_BROADCASTS")]
    echo_broadcasts: bool,

    /// Do not announce users going online and offline
    #[arg(long, env = "TIDEWIRE_NO_PRESENCE")]
    no_presence: bool,

    /// Tell channel members when another connection joins or leaves
    #[arg(long, env = "TIDEWIRE_ANNOUNCE_MEMBERSHIP")]
    announce_membership: bool,

    /// Reject broadcasts to channels the sender has not joined
    #[arg(long, env = "TIDEWIRE_REQUIRE_MEMBERSHIP")]
    require_membership: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIDEWIRE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerRuntimeConfig {
        ServerRuntimeConfig {
            bind_address: self.bind,
            identity_header: self.identity_header,
            outbound_queue_capacity: self.queue_capacity,
            max_message_bytes: self.max_message_bytes,
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            hub: HubConfig {
                echo_broadcasts: self.echo_broadcasts,
                announce_presence: !self.no_presence,
                announce_membership: self.announce_membership,
                broadcast_requires_membership: self.require_membership,
                max_subscriptions_per_connection: self.max_subscriptions,
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = args.into_config();
    tracing::info!(
        bind = %config.bind_address,
        identity_header = %config.identity_header,
        echo_broadcasts = config.hub.echo_broadcasts,
        announce_presence = config.hub.announce_presence,
        announce_membership = config.hub.announce_membership,
        "tidewire server starting"
    );

    let server = Server::bind(config).await?;

    tracing::info!(addr = %server.local_addr()?, "server listening");

    server.run().await?;

    Ok(())
}
