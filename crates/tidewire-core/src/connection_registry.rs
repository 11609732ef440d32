//! Connection registry: which users hold which live connections.
//!
//! Maintains bidirectional mappings: connection → owning user and transport
//! handle (for delivery), and user → live connections (for user-targeted
//! messages and presence). A user may hold any number of connections at once,
//! one per device.
//!
//! Both indexes sit behind a single `RwLock` and every operation is one
//! critical section, so racing attach/detach calls for the same id serialize
//! and readers never see one index updated without the other. The lock is
//! never held while pushing to a transport.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    error::RegistryError,
    ids::{ConnectionId, UserId},
    transport::Transport,
};

const REGISTRY: &str = "connection";

/// Result of [`ConnectionRegistry::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// New connection recorded
    Attached {
        /// The user had no other live connection
        first_for_user: bool,
    },

    /// The id was already attached and its record was overwritten
    ///
    /// Connection ids are generated fresh per transport, so this indicates a
    /// bug in the caller. It is logged at error level.
    Replaced {
        /// User the id was attached to before
        previous_user: UserId,
        /// The (new) user had no other live connection
        first_for_user: bool,
    },
}

impl AttachOutcome {
    /// Whether this attach brought the user online.
    pub fn first_for_user(&self) -> bool {
        match self {
            Self::Attached { first_for_user } | Self::Replaced { first_for_user, .. } => {
                *first_for_user
            },
        }
    }
}

/// Result of a successful [`ConnectionRegistry::detach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    /// User the connection belonged to
    pub user_id: UserId,
    /// The user has no live connection left
    pub last_for_user: bool,
}

/// Point-in-time copy of both indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Connection → owning user
    pub connections: HashMap<ConnectionId, UserId>,
    /// User → live connections
    pub users: HashMap<UserId, HashSet<ConnectionId>>,
}

struct ConnectionRecord {
    user_id: UserId,
    transport: Arc<dyn Transport>,
}

#[derive(Default)]
struct Inner {
    /// Connection ID → owning user and transport
    connections: HashMap<ConnectionId, ConnectionRecord>,
    /// User ID → live connection IDs (never empty)
    users: HashMap<UserId, HashSet<ConnectionId>>,
}

/// Registry of live connections grouped by user.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live connection for `user_id`.
    ///
    /// Attaching an id that is already present overwrites its record, moving
    /// it to `user_id` if the user differs. The id is never duplicated.
    pub fn attach(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        transport: Arc<dyn Transport>,
    ) -> AttachOutcome {
        let mut inner = self.inner.write();

        let first_for_user = inner.users.get(&user_id).is_none_or(HashSet::is_empty);

        let previous = inner.connections.remove(&connection_id);
        if let Some(previous) = &previous {
            if let Some(ids) = inner.users.get_mut(&previous.user_id) {
                ids.remove(&connection_id);
                if ids.is_empty() {
                    inner.users.remove(&previous.user_id);
                }
            }
        }

        inner.users.entry(user_id.clone()).or_default().insert(connection_id.clone());
        let record = ConnectionRecord { user_id: user_id.clone(), transport };
        inner.connections.insert(connection_id.clone(), record);
        drop(inner);

        match previous {
            Some(previous) => {
                tracing::error!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    previous_user = %previous.user_id,
                    "connection id attached twice, record replaced"
                );
                AttachOutcome::Replaced { previous_user: previous.user_id, first_for_user }
            },
            None => AttachOutcome::Attached { first_for_user },
        }
    }

    /// Remove a connection.
    ///
    /// Returns `Ok(None)` for an unknown id; detaching twice is benign.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Corrupted` if the user index does not list the
    ///   connection its record points at
    pub fn detach(&self, connection_id: &ConnectionId) -> Result<Option<Detached>, RegistryError> {
        let mut inner = self.inner.write();

        let Some(record) = inner.connections.remove(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "detach of unknown connection");
            return Ok(None);
        };

        let user_id = record.user_id;
        let Some(ids) = inner.users.get_mut(&user_id) else {
            return Err(corrupted(format!(
                "user {user_id} missing from index while detaching {connection_id}"
            )));
        };
        if !ids.remove(connection_id) {
            return Err(corrupted(format!(
                "user {user_id} index does not list connection {connection_id}"
            )));
        }

        let last_for_user = ids.is_empty();
        if last_for_user {
            inner.users.remove(&user_id);
        }

        Ok(Some(Detached { user_id, last_for_user }))
    }

    /// Live connections of a user. Empty if the user is offline.
    pub fn connections_of(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.inner.read().users.get(user_id).cloned().unwrap_or_default()
    }

    /// Transport handle of a connection. `None` if not attached.
    pub fn transport_of(&self, connection_id: &ConnectionId) -> Option<Arc<dyn Transport>> {
        self.inner.read().connections.get(connection_id).map(|r| Arc::clone(&r.transport))
    }

    /// Look up many transports under a single read lock.
    ///
    /// Each id is paired with its transport, or `None` if it is no longer
    /// attached.
    pub fn transports_of<'a>(
        &self,
        connection_ids: impl IntoIterator<Item = &'a ConnectionId>,
    ) -> Vec<(ConnectionId, Option<Arc<dyn Transport>>)> {
        let inner = self.inner.read();
        connection_ids
            .into_iter()
            .map(|id| (id.clone(), inner.connections.get(id).map(|r| Arc::clone(&r.transport))))
            .collect()
    }

    /// User owning a connection. `None` if not attached.
    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.inner.read().connections.get(connection_id).map(|r| r.user_id.clone())
    }

    /// Check if a connection is attached.
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.inner.read().connections.contains_key(connection_id)
    }

    /// Check if a user has at least one live connection.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.read().users.contains_key(user_id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of users with at least one live connection.
    pub fn user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Every live connection id.
    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.inner.read().connections.keys().cloned().collect()
    }

    /// Copy both indexes.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let inner = self.inner.read();
        ConnectionSnapshot {
            connections: inner
                .connections
                .iter()
                .map(|(id, record)| (id.clone(), record.user_id.clone()))
                .collect(),
            users: inner.users.clone(),
        }
    }

    /// Verify that the two indexes describe the same relation.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Corrupted` describing the first disagreement found
    pub fn check_consistency(&self) -> Result<(), RegistryError> {
        let inner = self.inner.read();

        for (id, record) in &inner.connections {
            if !inner.users.get(&record.user_id).is_some_and(|ids| ids.contains(id)) {
                return Err(corrupted(format!(
                    "connection {id} owned by {} but absent from user index",
                    record.user_id
                )));
            }
        }

        for (user_id, ids) in &inner.users {
            if ids.is_empty() {
                return Err(corrupted(format!("user {user_id} has an empty connection set")));
            }
            for id in ids {
                match inner.connections.get(id) {
                    Some(record) if record.user_id == *user_id => {},
                    Some(record) => {
                        return Err(corrupted(format!(
                            "user {user_id} lists connection {id} owned by {}",
                            record.user_id
                        )));
                    },
                    None => {
                        return Err(corrupted(format!(
                            "user {user_id} lists unknown connection {id}"
                        )));
                    },
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
