//! Delivery router: resolve a target to live transports and push to each.
//!
//! Resolution happens in two short read-locked steps (membership, then
//! transports) and the push loop runs with no lock held. Every push is a
//! non-blocking enqueue; a full or closed queue is counted and skipped,
//! never retried and never surfaced as an error to the sender.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tidewire_proto::Event;

use crate::{
    channel_registry::ChannelRegistry,
    connection_registry::ConnectionRegistry,
    ids::{ChannelName, ConnectionId, UserId},
};

/// Who an event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single connection
    Connection(ConnectionId),
    /// Every live connection of a user
    User(UserId),
    /// Every member of a channel
    Channel(ChannelName),
    /// Every live connection
    Everyone,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(id) => write!(f, "connection:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Channel(name) => write!(f, "channel:{name}"),
            Self::Everyone => f.write_str("everyone"),
        }
    }
}

/// Outcome of one [`DeliveryRouter::deliver`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Recipients resolved from the target (after exclusion)
    pub resolved: usize,
    /// Events enqueued
    pub delivered: usize,
    /// Recipients whose transport was already gone (raced a detach)
    pub skipped: usize,
    /// Recipients whose queue refused the event (full or closed)
    pub dropped: usize,
}

impl DeliveryResult {
    /// Pushes actually attempted on a live transport.
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped
    }

    /// Whether no live connection was found for the target.
    pub fn is_miss(&self) -> bool {
        self.attempted() == 0
    }
}

/// Running totals across every delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryTotals {
    /// Number of `deliver` calls
    pub routed: u64,
    /// Events enqueued
    pub delivered: u64,
    /// Recipients skipped because their transport was gone
    pub skipped: u64,
    /// Recipients whose queue refused the event
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    routed: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
}

/// Fans events out to live connections.
pub struct DeliveryRouter {
    connections: Arc<ConnectionRegistry>,
    channels: Arc<ChannelRegistry>,
    counters: Counters,
}

impl DeliveryRouter {
    /// Create a router over the given registries.
    pub fn new(connections: Arc<ConnectionRegistry>, channels: Arc<ChannelRegistry>) -> Self {
        Self { connections, channels, counters: Counters::default() }
    }

    /// Resolve `target` and push `event` to every recipient except `exclude`.
    ///
    /// Zero recipients is a successful no-op.
    pub fn deliver(
        &self,
        target: &Target,
        event: Event,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryResult {
        let mut recipients = self.resolve(target);
        if let Some(excluded) = exclude {
            recipients.remove(excluded);
        }

        let event = Arc::new(event);
        let mut result = DeliveryResult { resolved: recipients.len(), ..DeliveryResult::default() };

        for (id, transport) in self.connections.transports_of(&recipients) {
            let Some(transport) = transport else {
                result.skipped += 1;
                tracing::trace!(connection_id = %id, "recipient detached before push");
                continue;
            };

            match transport.send(Arc::clone(&event)) {
                Ok(()) => result.delivered += 1,
                Err(e) => {
                    result.dropped += 1;
                    tracing::debug!(
                        connection_id = %id,
                        event = event.name(),
                        error = %e,
                        "push refused"
                    );
                },
            }
        }

        self.record(&result);

        tracing::debug!(
            to = %target,
            event = event.name(),
            resolved = result.resolved,
            delivered = result.delivered,
            skipped = result.skipped,
            dropped = result.dropped,
            "routed"
        );

        result
    }

    /// Running totals since the router was created.
    pub fn totals(&self) -> DeliveryTotals {
        DeliveryTotals {
            routed: self.counters.routed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn resolve(&self, target: &Target) -> HashSet<ConnectionId> {
        match target {
            Target::Connection(id) => HashSet::from([id.clone()]),
            Target::User(user_id) => self.connections.connections_of(user_id),
            Target::Channel(channel) => self.channels.members_of(channel),
            Target::Everyone => self.connections.all_connections().into_iter().collect(),
        }
    }

    fn record(&self, result: &DeliveryResult) {
        self.counters.routed.fetch_add(1, Ordering::Relaxed);
        self.counters.delivered.fetch_add(result.delivered as u64, Ordering::Relaxed);
        self.counters.skipped.fetch_add(result.skipped as u64, Ordering::Relaxed);
        self.counters.dropped.fetch_add(result.dropped as u64, Ordering::Relaxed);
    }
}
