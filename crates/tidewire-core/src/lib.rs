//! Core hub logic: registries, routing and per-connection sessions.
//!
//! Everything here is synchronous and I/O-free. The server binding owns the
//! sockets and the runtime; this crate owns the state and the rules.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: user → live connections, connection → transport
//! - [`ChannelRegistry`]: channel → members, connection → joined channels
//! - [`DeliveryRouter`]: resolves a [`Target`] and pushes to live transports
//! - [`HubSession`]: state machine driving one connection
//! - [`Hub`]: the shared context bundling all of the above
//!
//! # Data flow
//!
//! A connection attaches (registry + channel enrollment), issues commands
//! that mutate channel membership or hand events to the router, and finally
//! detaches, which removes it from both registries and prunes channels it
//! leaves empty.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel_registry;
pub mod connection_registry;
pub mod env;
pub mod error;
pub mod hub;
pub mod ids;
pub mod router;
pub mod session;
pub mod transport;

pub use channel_registry::{ChannelRegistry, ChannelSnapshot};
pub use connection_registry::{AttachOutcome, ConnectionRegistry, ConnectionSnapshot, Detached};
pub use env::Environment;
pub use error::{RegistryError, SessionError, TransportError};
pub use hub::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SUBSCRIPTIONS, Hub, HubConfig};
pub use ids::{ChannelName, ConnectionId, UserId};
pub use router::{DeliveryResult, DeliveryRouter, DeliveryTotals, Target};
pub use session::{CommandOutcome, HubSession, SessionState};
pub use transport::{QueueTransport, Transport};
