//! Observable hub state for invariant checking.
//!
//! Each registry is copied under its own read lock, so a snapshot is only
//! meaningful while no operation is in flight.

use std::collections::{HashMap, HashSet};

use tidewire_core::{ChannelName, ConnectionId, Hub, UserId};

/// Copy of every hub index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Connection → owning user
    pub connections: HashMap<ConnectionId, UserId>,
    /// User → live connections
    pub users: HashMap<UserId, HashSet<ConnectionId>>,
    /// Channel → member connections
    pub channels: HashMap<ChannelName, HashSet<ConnectionId>>,
    /// Enrolled connection → joined channels
    pub memberships: HashMap<ConnectionId, HashSet<ChannelName>>,
}

impl HubSnapshot {
    /// Capture the current state of `hub`.
    pub fn from_hub(hub: &Hub) -> Self {
        let connections = hub.connections().snapshot();
        let channels = hub.channels().snapshot();
        Self {
            connections: connections.connections,
            users: connections.users,
            channels: channels.channels,
            memberships: channels.memberships,
        }
    }

    /// Members of `channel`, empty if it does not exist.
    pub fn members_of(&self, channel: &str) -> HashSet<ConnectionId> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }
}
