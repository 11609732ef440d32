//! In-memory client: a [`HubSession`] wired to a queue the test can read.
//!
//! Stands in for a WebSocket connection. Commands go straight into the
//! session and every event the hub pushes lands in the client's queue, where
//! [`SimClient::drain`] picks it up.

use std::sync::Arc;

use serde_json::Value;
use tidewire_core::{
    AttachOutcome, CommandOutcome, ConnectionId, Detached, Hub, HubSession, QueueTransport,
    SessionError, UserId,
};
use tidewire_proto::{Command, Event};
use tokio::sync::mpsc;

use crate::sim_env::SimEnv;

/// Outbound queue capacity used by [`SimClient::connect`].
pub const DEFAULT_CLIENT_QUEUE: usize = 1024;

/// A simulated connection.
pub struct SimClient {
    session: HubSession<SimEnv>,
    transport: Arc<QueueTransport>,
    rx: Option<mpsc::Receiver<Arc<Event>>>,
}

impl SimClient {
    /// Open a connection without attaching it.
    pub fn open(hub: &Arc<Hub>, env: &SimEnv, queue_capacity: usize) -> Self {
        let (transport, rx) = QueueTransport::channel(queue_capacity);
        let transport = Arc::new(transport);
        let session = HubSession::new(Arc::clone(hub), env.clone(), transport.clone());
        Self { session, transport, rx: Some(rx) }
    }

    /// Open a connection and attach it as `user`.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::attach`] errors.
    pub fn connect(hub: &Arc<Hub>, env: &SimEnv, user: &str) -> Result<Self, SessionError> {
        Self::connect_with_capacity(hub, env, user, DEFAULT_CLIENT_QUEUE)
    }

    /// Like [`SimClient::connect`] with an explicit outbound queue size.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::attach`] errors.
    pub fn connect_with_capacity(
        hub: &Arc<Hub>,
        env: &SimEnv,
        user: &str,
        queue_capacity: usize,
    ) -> Result<Self, SessionError> {
        let mut client = Self::open(hub, env, queue_capacity);
        client.attach(user)?;
        Ok(client)
    }

    /// Attach the connection as `user`.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::attach`] errors.
    pub fn attach(&mut self, user: &str) -> Result<AttachOutcome, SessionError> {
        self.session.attach(UserId::from(user))
    }

    /// Send a command.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::handle_command`] errors.
    pub fn send(&mut self, command: Command) -> Result<CommandOutcome, SessionError> {
        self.session.handle_command(command)
    }

    /// Send a raw text frame.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::handle_text`] errors.
    pub fn send_text(&mut self, text: &str) -> Result<CommandOutcome, SessionError> {
        self.session.handle_text(text)
    }

    /// Subscribe to `channel`.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::handle_command`] errors.
    pub fn subscribe(&mut self, channel: &str) -> Result<CommandOutcome, SessionError> {
        self.send(Command::Subscribe { channel: channel.to_string() })
    }

    /// Broadcast a text message to `channel`.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::handle_command`] errors.
    pub fn broadcast(
        &mut self,
        channel: &str,
        message: &str,
    ) -> Result<CommandOutcome, SessionError> {
        self.send(Command::Broadcast {
            channel: channel.to_string(),
            message: Some(message.to_string()),
            data: Value::Null,
        })
    }

    /// Send a text message to every connection of `user`.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::handle_command`] errors.
    pub fn send_to_user(
        &mut self,
        user: &str,
        message: &str,
    ) -> Result<CommandOutcome, SessionError> {
        self.send(Command::SendToUser {
            to: user.to_string(),
            message: Some(message.to_string()),
            data: Value::Null,
        })
    }

    /// Detach from the hub.
    ///
    /// # Errors
    ///
    /// Propagates [`HubSession::detach`] errors.
    pub fn disconnect(&mut self) -> Result<Option<Detached>, SessionError> {
        let detached = self.session.detach()?;
        tracing::trace!(connection_id = %self.session.connection_id(), "sim client disconnected");
        Ok(detached)
    }

    /// Drop the receiving side, as if the socket died before detach ran.
    ///
    /// Later pushes to this connection are refused as closed.
    pub fn kill_receiver(&mut self) {
        self.rx = None;
    }

    /// Every event received since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<Event> {
        let Some(rx) = self.rx.as_mut() else {
            return Vec::new();
        };
        std::iter::from_fn(|| rx.try_recv().ok()).map(|event| (*event).clone()).collect()
    }

    /// Drain and keep only events named `name`.
    pub fn drain_named(&mut self, name: &str) -> Vec<Event> {
        self.drain().into_iter().filter(|event| event.name() == name).collect()
    }

    /// Connection id assigned to this client.
    pub fn connection_id(&self) -> &ConnectionId {
        self.session.connection_id()
    }

    /// Events the hub failed to enqueue for this client.
    pub fn dropped(&self) -> u64 {
        self.transport.dropped()
    }

    /// The underlying session.
    pub fn session(&self) -> &HubSession<SimEnv> {
        &self.session
    }

    /// The underlying session, mutably.
    pub fn session_mut(&mut self) -> &mut HubSession<SimEnv> {
        &mut self.session
    }
}
