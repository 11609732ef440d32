//! The hub: registries, router, configuration and counters in one place.
//!
//! A single [`Hub`] is shared by every session through an `Arc`. It owns no
//! I/O; the server binding creates one at startup and hands a clone of the
//! `Arc` to each connection task.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tidewire_proto::HubStats;

use crate::{
    channel_registry::ChannelRegistry, connection_registry::ConnectionRegistry,
    error::RegistryError, router::DeliveryRouter,
};

/// Maximum time a session may go without inbound activity.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum channels a single connection may join.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 256;

/// Hub behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Deliver a broadcast back to the sending connection too
    pub echo_broadcasts: bool,
    /// Announce users going online/offline to every other connection
    pub announce_presence: bool,
    /// Tell channel members when another connection joins or leaves
    pub announce_membership: bool,
    /// Reject broadcasts to channels the sender has not joined
    pub broadcast_requires_membership: bool,
    /// Channels a single connection may join
    pub max_subscriptions_per_connection: usize,
    /// Inactivity after which a session is closed
    pub idle_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            echo_broadcasts: false,
            announce_presence: true,
            announce_membership: false,
            broadcast_requires_membership: false,
            max_subscriptions_per_connection: DEFAULT_MAX_SUBSCRIPTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Shared hub state.
pub struct Hub {
    config: HubConfig,
    connections: Arc<ConnectionRegistry>,
    channels: Arc<ChannelRegistry>,
    router: DeliveryRouter,
    total_connections: AtomicU64,
    caller_errors: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// Create an empty hub.
    pub fn new(config: HubConfig) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let router = DeliveryRouter::new(Arc::clone(&connections), Arc::clone(&channels));

        Self {
            config,
            connections,
            channels,
            router,
            total_connections: AtomicU64::new(0),
            caller_errors: AtomicU64::new(0),
        }
    }

    /// Create an empty hub behind an `Arc`, ready to share with sessions.
    pub fn shared(config: HubConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Connection registry.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Channel registry.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Delivery router.
    pub fn router(&self) -> &DeliveryRouter {
        &self.router
    }

    /// Hub-wide counters.
    pub fn stats(&self) -> HubStats {
        let totals = self.router.totals();
        HubStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.connections.connection_count() as u64,
            active_users: self.connections.user_count() as u64,
            active_channels: self.channels.channel_count() as u64,
            messages_routed: totals.routed,
            deliveries: totals.delivered,
            deliveries_skipped: totals.skipped,
            deliveries_dropped: totals.dropped,
            caller_errors: self.caller_errors.load(Ordering::Relaxed),
        }
    }

    /// Verify both registries.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Corrupted` from whichever registry disagrees with
    ///   itself first
    pub fn check_consistency(&self) -> Result<(), RegistryError> {
        self.connections.check_consistency()?;
        self.channels.check_consistency()
    }

    pub(crate) fn record_attach(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_caller_error(&self) {
        self.caller_errors.fetch_add(1, Ordering::Relaxed);
    }
}
