//! Opaque identifiers.
//!
//! Users, connections and channels are all named by strings on the wire.
//! Wrapping each in its own type keeps them from being mixed up inside the
//! registries.

use std::{borrow::Borrow, fmt};

use crate::env::Environment;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwrap into the raw identifier.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// External identity of a user. Resolved before the hub sees it.
    UserId
}

string_id! {
    /// Id of one live physical connection. Unique for the hub's lifetime.
    ConnectionId
}

string_id! {
    /// Name of a channel. Exists while it has at least one member.
    ChannelName
}

impl ConnectionId {
    /// Generate a fresh random id (16 lowercase hex digits).
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self(format!("{:016x}", env.random_u64()))
    }
}
