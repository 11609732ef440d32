//! Tidewire production server.
//!
//! Binds the hub core to real sockets: a Tokio TCP listener, WebSocket
//! upgrades via tokio-tungstenite, system time and OS randomness.
//!
//! # Architecture
//!
//! [`tidewire_core`] owns all state and rules and performs no I/O. This crate
//! owns the sockets: one task per connection reads frames into a
//! [`HubSession`](tidewire_core::HubSession), and one writer task per
//! connection drains its outbound queue into the socket.
//!
//! # Components
//!
//! - [`Server`]: accept loop and shared [`Hub`]
//! - [`WsListener`]: TCP listener and WebSocket upgrade
//! - [`IdentityResolver`]: maps an upgrade request to a user id
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod identity;
mod system_env;
mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use error::ServerError;
pub use identity::{
    DEFAULT_IDENTITY_HEADER, HeaderIdentity, IDENTITY_QUERY_PARAM, IdentityResolver,
};
pub use system_env::SystemEnv;
use tidewire_core::{Hub, HubConfig};
use tidewire_proto::DEFAULT_MAX_COMMAND_BYTES;
pub use transport::{WsListener, WsStream, upgrade};

use crate::connection::ConnectionContext;

/// Default outbound queue size per connection.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Default interval between heartbeat pings and idle checks.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Header carrying the authenticated user id
    pub identity_header: String,
    /// Events buffered per connection before pushes are dropped
    pub outbound_queue_capacity: usize,
    /// Largest accepted inbound text frame, in bytes
    pub max_message_bytes: usize,
    /// Interval between heartbeat pings (also the idle check period)
    pub heartbeat_interval: Duration,
    /// Hub behavior
    pub hub: HubConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE,
            max_message_bytes: DEFAULT_MAX_COMMAND_BYTES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            hub: HubConfig::default(),
        }
    }
}

impl ServerRuntimeConfig {
    /// Reject settings the runtime cannot honor.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` naming the offending setting
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ServerError::Config("heartbeat interval must be non-zero".to_string()));
        }
        if self.hub.idle_timeout.is_zero() {
            return Err(ServerError::Config("idle timeout must be non-zero".to_string()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ServerError::Config("outbound queue capacity must be non-zero".to_string()));
        }
        if self.max_message_bytes == 0 {
            return Err(ServerError::Config("max message size must be non-zero".to_string()));
        }
        if self.identity_header.trim().is_empty() {
            return Err(ServerError::Config("identity header must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Production tidewire server.
pub struct Server {
    listener: WsListener,
    ctx: Arc<ConnectionContext>,
}

impl Server {
    /// Validate `config`, create the hub and bind the listener.
    ///
    /// Identity is read from `config.identity_header` (or `?user=`); use
    /// [`Server::bind_with_identity`] to supply another resolver.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let resolver = HeaderIdentity::new(config.identity_header.clone());
        Self::bind_with_identity(config, resolver).await
    }

    /// Like [`Server::bind`] with a custom identity resolver.
    pub async fn bind_with_identity(
        config: ServerRuntimeConfig,
        identity: impl IdentityResolver,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = WsListener::bind(&config.bind_address).await?;
        let hub = Hub::shared(config.hub.clone());
        let identity: Arc<dyn IdentityResolver> = Arc::new(identity);
        let ctx = ConnectionContext { hub, env: SystemEnv::new(), config, identity };

        Ok(Self { listener, ctx: Arc::new(ctx) })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr()
    }

    /// The hub shared by every connection.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.ctx.hub
    }

    /// Run the server, accepting connections until the task is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(addr = %self.listener.local_addr()?, "server starting");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        match connection::serve(stream, peer, ctx).await {
                            Ok(()) => {},
                            Err(ServerError::Unauthorized) => {
                                tracing::info!(peer = %peer, "upgrade rejected: no identity");
                            },
                            Err(e) => tracing::warn!(peer = %peer, error = %e, "connection error"),
                        }
                    });
                },
                Err(e) => {
                    tracing::error!(error = %e, "accept error");
                },
            }
        }
    }
}
