//! Deterministic simulation harness for the tidewire hub.
//!
//! In-memory implementations of the environment and client connections for
//! reproducible tests without sockets or a runtime.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold whenever the hub
//! is quiescent: no membership outlives its connection, and each registry's
//! two indexes agree. Use [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_client;
pub mod sim_env;

pub use invariants::{
    ChannelIndexConsistency, HubSnapshot, Invariant, InvariantRegistry, InvariantResult,
    NoOrphanMembership, UserIndexConsistency, Violation,
};
pub use sim_client::{DEFAULT_CLIENT_QUEUE, SimClient};
pub use sim_env::{SimEnv, SimInstant};
