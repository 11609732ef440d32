//! Standard invariant checks.

use super::{HubSnapshot, Invariant, InvariantResult, Violation};

/// Every channel member and every enrolled connection is a live connection.
///
/// Detach removes the connection from the connection registry before it
/// clears memberships, so between operations no membership may point at a
/// connection that is gone.
pub struct NoOrphanMembership;

impl Invariant for NoOrphanMembership {
    fn name(&self) -> &'static str {
        "no_orphan_membership"
    }

    fn check(&self, state: &HubSnapshot) -> InvariantResult {
        for (channel, members) in &state.channels {
            for id in members {
                if !state.connections.contains_key(id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("channel {channel} lists detached connection {id}"),
                    });
                }
            }
        }

        for id in state.memberships.keys() {
            if !state.connections.contains_key(id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("detached connection {id} still has a membership slot"),
                });
            }
        }
        Ok(())
    }
}

/// The user index lists exactly the attached connections, each under its
/// owner, and never holds an empty set.
pub struct UserIndexConsistency;

impl Invariant for UserIndexConsistency {
    fn name(&self) -> &'static str {
        "user_index_consistency"
    }

    fn check(&self, state: &HubSnapshot) -> InvariantResult {
        for (id, user) in &state.connections {
            if !state.users.get(user).is_some_and(|ids| ids.contains(id)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("connection {id} of {user} missing from user index"),
                });
            }
        }

        for (user, ids) in &state.users {
            if ids.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("user {user} has an empty connection set"),
                });
            }
            for id in ids {
                if state.connections.get(id) != Some(user) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("user {user} lists connection {id} it does not own"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Channel and membership indexes describe the same relation, and no empty
/// channel lingers.
pub struct ChannelIndexConsistency;

impl Invariant for ChannelIndexConsistency {
    fn name(&self) -> &'static str {
        "channel_index_consistency"
    }

    fn check(&self, state: &HubSnapshot) -> InvariantResult {
        for (channel, members) in &state.channels {
            if members.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("channel {channel} is empty but not pruned"),
                });
            }
            for id in members {
                if !state.memberships.get(id).is_some_and(|joined| joined.contains(channel)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("channel {channel} lists {id} without a back reference"),
                    });
                }
            }
        }

        for (id, joined) in &state.memberships {
            for channel in joined {
                if !state.channels.get(channel).is_some_and(|members| members.contains(id)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("connection {id} lists channel {channel} not listing it"),
                    });
                }
            }
        }
        Ok(())
    }
}
