//! Channel registry: which connections are members of which channels.
//!
//! Maintains bidirectional mappings: channel → member connections (for
//! broadcast) and connection → joined channels (for cleanup on detach).
//! Channels are created implicitly by the first join and pruned when their
//! last member leaves.
//!
//! A connection must be enrolled before it can join anything. Enrollment
//! opens its entry in the reverse index; `leave_all` closes it. A join that
//! races a detach therefore either lands before `leave_all` (and is removed
//! by it) or fails with `NotEnrolled`, so no membership outlives its
//! connection.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::{
    error::RegistryError,
    ids::{ChannelName, ConnectionId},
};

const REGISTRY: &str = "channel";

/// Point-in-time copy of both indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Channel → member connections
    pub channels: HashMap<ChannelName, HashSet<ConnectionId>>,
    /// Enrolled connection → joined channels
    pub memberships: HashMap<ConnectionId, HashSet<ChannelName>>,
}

#[derive(Default)]
struct Inner {
    /// Channel → member connection IDs (never empty)
    channels: HashMap<ChannelName, HashSet<ConnectionId>>,
    /// Connection ID → joined channels; present iff enrolled
    memberships: HashMap<ConnectionId, HashSet<ChannelName>>,
}

/// Registry of channel memberships.
#[derive(Default)]
pub struct ChannelRegistry {
    inner: RwLock<Inner>,
}

impl ChannelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a membership slot for a newly attached connection.
    ///
    /// Returns `false` if the connection was already enrolled.
    pub fn enroll(&self, connection_id: ConnectionId) -> bool {
        let mut inner = self.inner.write();
        if inner.memberships.contains_key(&connection_id) {
            return false;
        }
        inner.memberships.insert(connection_id, HashSet::new());
        true
    }

    /// Add a connection to a channel, creating the channel if needed.
    ///
    /// Returns `Ok(false)` if the connection was already a member.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotEnrolled` if the connection has no slot
    pub fn join(
        &self,
        channel: &ChannelName,
        connection_id: &ConnectionId,
    ) -> Result<bool, RegistryError> {
        let mut inner = self.inner.write();

        let Some(joined) = inner.memberships.get_mut(connection_id) else {
            return Err(RegistryError::NotEnrolled(connection_id.clone()));
        };
        if !joined.insert(channel.clone()) {
            return Ok(false);
        }

        inner.channels.entry(channel.clone()).or_default().insert(connection_id.clone());
        Ok(true)
    }

    /// Remove a connection from a channel, pruning the channel if it empties.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&self, channel: &ChannelName, connection_id: &ConnectionId) -> bool {
        let mut inner = self.inner.write();

        let removed_from_channel =
            inner.channels.get_mut(channel).is_some_and(|members| members.remove(connection_id));
        let removed_from_connection =
            inner.memberships.get_mut(connection_id).is_some_and(|joined| joined.remove(channel));

        if inner.channels.get(channel).is_some_and(HashSet::is_empty) {
            inner.channels.remove(channel);
        }

        removed_from_channel && removed_from_connection
    }

    /// Remove a connection from every channel and close its slot.
    ///
    /// Returns the channels it left, sorted. An unknown connection yields an
    /// empty list; calling this twice is benign.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Corrupted` if the reverse index names a channel that
    ///   does not list the connection. Every other membership is still removed.
    pub fn leave_all(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<ChannelName>, RegistryError> {
        let mut inner = self.inner.write();

        let Some(joined) = inner.memberships.remove(connection_id) else {
            return Ok(Vec::new());
        };

        let mut left = Vec::with_capacity(joined.len());
        let mut missing = Vec::new();
        for channel in joined {
            let removed = match inner.channels.get_mut(&channel) {
                Some(members) => {
                    let removed = members.remove(connection_id);
                    if members.is_empty() {
                        inner.channels.remove(&channel);
                    }
                    removed
                },
                None => false,
            };
            if removed {
                left.push(channel);
            } else {
                missing.push(channel);
            }
        }
        drop(inner);

        if !missing.is_empty() {
            missing.sort();
            let detail = format!(
                "connection {connection_id} listed channels {missing:?} that do not list it back"
            );
            tracing::error!(registry = REGISTRY, detail = %detail, "registry corrupted");
            return Err(RegistryError::Corrupted { registry: REGISTRY, detail });
        }

        left.sort();
        Ok(left)
    }

    /// Members of a channel. Empty for an unknown channel.
    pub fn members_of(&self, channel: &ChannelName) -> HashSet<ConnectionId> {
        self.inner.read().channels.get(channel).cloned().unwrap_or_default()
    }

    /// Channels a connection has joined, sorted.
    pub fn channels_of(&self, connection_id: &ConnectionId) -> Vec<ChannelName> {
        let mut channels: Vec<_> = self
            .inner
            .read()
            .memberships
            .get(connection_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Number of channels a connection has joined.
    pub fn subscription_count(&self, connection_id: &ConnectionId) -> usize {
        self.inner.read().memberships.get(connection_id).map_or(0, HashSet::len)
    }

    /// Check if a connection is a member of a channel.
    pub fn is_member(&self, channel: &ChannelName, connection_id: &ConnectionId) -> bool {
        self.inner
            .read()
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Check if a connection has an open slot.
    pub fn is_enrolled(&self, connection_id: &ConnectionId) -> bool {
        self.inner.read().memberships.contains_key(connection_id)
    }

    /// Number of channels with at least one member.
    pub fn channel_count(&self) -> usize {
        self.inner.read().channels.len()
    }

    /// Number of members in a channel.
    pub fn member_count(&self, channel: &ChannelName) -> usize {
        self.inner.read().channels.get(channel).map_or(0, HashSet::len)
    }

    /// Copy both indexes.
    pub fn snapshot(&self) -> ChannelSnapshot {
        let inner = self.inner.read();
        ChannelSnapshot { channels: inner.channels.clone(), memberships: inner.memberships.clone() }
    }

    /// Verify that the two indexes describe the same relation and that no
    /// empty channel lingers.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Corrupted` describing the first disagreement found
    pub fn check_consistency(&self) -> Result<(), RegistryError> {
        let inner = self.inner.read();

        for (channel, members) in &inner.channels {
            if members.is_empty() {
                return Err(corrupted(format!("channel {channel} is empty but not pruned")));
            }
            for id in members {
                if !inner.memberships.get(id).is_some_and(|joined| joined.contains(channel)) {
                    return Err(corrupted(format!(
                        "channel {channel} lists {id} but its slot does not list the channel"
                    )));
                }
            }
        }

        for (id, joined) in &inner.memberships {
            for channel in joined {
                if !inner.channels.get(channel).is_some_and(|members| members.contains(id)) {
                    return Err(corrupted(format!(
                        "connection {id} lists channel {channel} which does not list it"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn corrupted(detail: String) -> RegistryError {
    tracing::error!(registry = REGISTRY, detail = %detail, "registry corrupted");
    RegistryError::Corrupted { registry: REGISTRY, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn channel(name: &str) -> ChannelName {
        ChannelName::from(name)
    }

    fn enrolled(ids: &[&str]) -> ChannelRegistry {
        let registry = ChannelRegistry::new();
        for id in ids {
            assert!(registry.enroll(conn(id)));
        }
        registry
    }

    #[test]
    fn join_creates_channel() {
        let registry = enrolled(&["c1"]);

        assert_eq!(registry.join(&channel("lobby"), &conn("c1")), Ok(true));
        assert!(registry.is_member(&channel("lobby"), &conn("c1")));
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.member_count(&channel("lobby")), 1);
    }

    #[test]
    fn join_twice_is_noop() {
        let registry = enrolled(&["c1"]);

        registry.join(&channel("lobby"), &conn("c1")).unwrap();
        assert_eq!(registry.join(&channel("lobby"), &conn("c1")), Ok(false));
        assert_eq!(registry.member_count(&channel("lobby")), 1);
        assert_eq!(registry.subscription_count(&conn("c1")), 1);
    }

    #[test]
    fn join_requires_enrollment() {
        let registry = ChannelRegistry::new();

        assert_eq!(
            registry.join(&channel("lobby"), &conn("c1")),
            Err(RegistryError::NotEnrolled(conn("c1")))
        );
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn enroll_twice_returns_false() {
        let registry = enrolled(&["c1"]);
        assert!(!registry.enroll(conn("c1")));
    }

    #[test]
    fn leave_prunes_empty_channel() {
        let registry = enrolled(&["c1", "c2"]);
        registry.join(&channel("lobby"), &conn("c1")).unwrap();
        registry.join(&channel("lobby"), &conn("c2")).unwrap();

        assert!(registry.leave(&channel("lobby"), &conn("c1")));
        assert_eq!(registry.channel_count(), 1);

        assert!(registry.leave(&channel("lobby"), &conn("c2")));
        assert_eq!(registry.channel_count(), 0);
        assert!(registry.members_of(&channel("lobby")).is_empty());
    }

    #[test]
    fn leave_non_member_is_benign() {
        let registry = enrolled(&["c1"]);
        assert!(!registry.leave(&channel("lobby"), &conn("c1")));
        assert!(!registry.leave(&channel("lobby"), &conn("ghost")));
    }

    #[test]
    fn leave_all_removes_everything_and_closes_slot() {
        let registry = enrolled(&["c1", "c2"]);
        registry.join(&channel("b"), &conn("c1")).unwrap();
        registry.join(&channel("a"), &conn("c1")).unwrap();
        registry.join(&channel("a"), &conn("c2")).unwrap();

        let left = registry.leave_all(&conn("c1")).unwrap();
        assert_eq!(left, vec![channel("a"), channel("b")]);

        assert!(!registry.is_enrolled(&conn("c1")));
        assert_eq!(registry.members_of(&channel("a")), HashSet::from([conn("c2")]));
        assert_eq!(registry.member_count(&channel("b")), 0);
        assert_eq!(
            registry.join(&channel("a"), &conn("c1")),
            Err(RegistryError::NotEnrolled(conn("c1")))
        );
        registry.check_consistency().unwrap();
    }

    #[test]
    fn leave_all_unknown_is_empty() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.leave_all(&conn("ghost")), Ok(Vec::new()));
    }

    #[test]
    fn channel_can_be_recreated() {
        let registry = enrolled(&["c1", "c2"]);
        registry.join(&channel("lobby"), &conn("c1")).unwrap();
        registry.leave(&channel("lobby"), &conn("c1"));
        assert_eq!(registry.join(&channel("lobby"), &conn("c2")), Ok(true));
        assert_eq!(registry.members_of(&channel("lobby")), HashSet::from([conn("c2")]));
    }

    #[test]
    fn channels_of_is_sorted() {
        let registry = enrolled(&["c1"]);
        for name in ["zeta", "alpha", "mid"] {
            registry.join(&channel(name), &conn("c1")).unwrap();
        }
        assert_eq!(
            registry.channels_of(&conn("c1")),
            vec![channel("alpha"), channel("mid"), channel("zeta")]
        );
    }
}
