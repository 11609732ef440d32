//! Per-connection session state machine.
//!
//! A [`HubSession`] drives one physical connection: it attaches the
//! connection to the hub, dispatches inbound commands, and detaches it again
//! when the transport closes. It performs no I/O of its own. Replies go out
//! through the connection's transport handle, fan-out goes through the
//! router, and time is read from the [`Environment`].
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐  attach   ┌──────────┐  detach   ┌──────────┐
//! │ Connecting │──────────>│ Attached │──────────>│ Detached │
//! └────────────┘           └──────────┘           └──────────┘
//!       │                    │      ^                   ^
//!       │                    └──────┘ command           │
//!       └───────────────────────────────────────────────┘
//!                            detach
//! ```
//!
//! The sender of every outbound message is the user resolved at attach time.
//! Commands carry no sender field, so a client cannot speak for someone else.

use std::sync::Arc;

use tidewire_proto::{
    ChannelAck, ChannelMessage, Command, Connected, DEFAULT_MAX_COMMAND_BYTES, DirectMessage,
    ErrorCode, ErrorReply, Event, MembershipNotice, MembershipStatus, Pong, PresenceNotice,
    PresenceStatus, StatusReport, TypingNotice,
};

use crate::{
    connection_registry::{AttachOutcome, Detached},
    env::Environment,
    error::SessionError,
    hub::Hub,
    ids::{ChannelName, ConnectionId, UserId},
    router::{DeliveryResult, Target},
    transport::Transport,
};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is open, identity not yet attached
    Connecting,
    /// Registered with the hub and accepting commands
    Attached,
    /// Removed from the hub (terminal)
    Detached,
}

/// What handling one command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Answered the caller directly (`subscribed`, `pong`, `status`, ...)
    Replied,
    /// Routed an event to other connections
    Delivered(DeliveryResult),
    /// Answered the caller with an `error` event
    Rejected(ErrorCode),
}

/// State machine for one connection.
pub struct HubSession<E: Environment> {
    hub: Arc<Hub>,
    env: E,
    connection_id: ConnectionId,
    user_id: Option<UserId>,
    transport: Arc<dyn Transport>,
    state: SessionState,
    last_activity: E::Instant,
    max_command_bytes: usize,
}

impl<E: Environment> HubSession<E> {
    /// Create a session for a freshly opened transport, with a new random
    /// connection id.
    pub fn new(hub: Arc<Hub>, env: E, transport: Arc<dyn Transport>) -> Self {
        let connection_id = ConnectionId::generate(&env);
        let last_activity = env.now();
        Self {
            hub,
            env,
            connection_id,
            user_id: None,
            transport,
            state: SessionState::Connecting,
            last_activity,
            max_command_bytes: DEFAULT_MAX_COMMAND_BYTES,
        }
    }

    /// Override the inbound frame size limit.
    #[must_use]
    pub fn with_max_command_bytes(mut self, max_command_bytes: usize) -> Self {
        self.max_command_bytes = max_command_bytes;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of this connection.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// User this connection is attached as. `None` before attach.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Shared hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Time of the last inbound activity.
    pub fn last_activity(&self) -> E::Instant {
        self.last_activity
    }

    /// Register the connection as `user_id` and reply `connected`.
    ///
    /// If this is the user's first live connection, every other connection
    /// is told the user came online.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if already attached
    /// - `SessionError::Stale` if already detached
    pub fn attach(&mut self, user_id: UserId) -> Result<AttachOutcome, SessionError> {
        match self.state {
            SessionState::Connecting => {},
            SessionState::Attached => {
                return Err(SessionError::InvalidState { state: self.state, operation: "attach" });
            },
            SessionState::Detached => return Err(SessionError::Stale(self.connection_id.clone())),
        }

        let outcome = self.hub.connections().attach(
            user_id.clone(),
            self.connection_id.clone(),
            Arc::clone(&self.transport),
        );
        if !self.hub.channels().enroll(self.connection_id.clone()) {
            tracing::warn!(connection_id = %self.connection_id, "connection was already enrolled");
        }
        self.hub.record_attach();

        self.state = SessionState::Attached;
        self.user_id = Some(user_id.clone());
        self.last_activity = self.env.now();

        self.reply(Event::Connected(Connected {
            connection_id: self.connection_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: self.env.timestamp(),
        }));

        if outcome.first_for_user() && self.hub.config().announce_presence {
            self.announce(&user_id, PresenceStatus::Online, Some(&self.connection_id));
        }

        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %user_id,
            first_for_user = outcome.first_for_user(),
            "connection attached"
        );

        Ok(outcome)
    }

    /// Decode and handle one inbound text frame.
    ///
    /// Malformed frames are answered with an `error` event and reported as
    /// [`CommandOutcome::Rejected`]; the session stays attached.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAttached` before attach
    /// - `SessionError::Stale` after detach
    /// - `SessionError::Registry` if a registry reports corruption
    pub fn handle_text(&mut self, text: &str) -> Result<CommandOutcome, SessionError> {
        let user_id = self.attached_user()?;
        self.touch();

        match Command::decode(text, self.max_command_bytes) {
            Ok(command) => self.dispatch(&user_id, command),
            Err(e) => Ok(self.reject(e.code(), e.to_string(), e.command())),
        }
    }

    /// Handle an already decoded command.
    ///
    /// # Errors
    ///
    /// Same as [`HubSession::handle_text`].
    pub fn handle_command(&mut self, command: Command) -> Result<CommandOutcome, SessionError> {
        let user_id = self.attached_user()?;
        self.touch();

        if let Err(e) = command.validate() {
            return Ok(self.reject(e.code(), e.to_string(), Some(command.name())));
        }
        self.dispatch(&user_id, command)
    }

    /// Answer a binary frame, which the hub does not accept.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAttached` before attach
    /// - `SessionError::Stale` after detach
    pub fn handle_binary(&mut self, len: usize) -> Result<CommandOutcome, SessionError> {
        self.attached_user()?;
        self.touch();

        Ok(self.reject(
            ErrorCode::UnsupportedFrame,
            format!("binary frames are not supported ({len} bytes received)"),
            None,
        ))
    }

    /// Record inbound activity (any frame, including protocol pings).
    pub fn touch(&mut self) {
        self.last_activity = self.env.now();
    }

    /// Check the idle timeout.
    ///
    /// # Errors
    ///
    /// - `SessionError::IdleTimeout` if attached and idle for longer than the
    ///   configured timeout. The caller should close the transport and detach.
    pub fn tick(&self, now: E::Instant) -> Result<(), SessionError> {
        if self.state != SessionState::Attached {
            return Ok(());
        }

        let elapsed = now - self.last_activity;
        if elapsed > self.hub.config().idle_timeout {
            return Err(SessionError::IdleTimeout { elapsed });
        }
        Ok(())
    }

    /// Remove the connection from the hub.
    ///
    /// Detaches from the connection registry first and only the caller that
    /// actually removed the connection clears its channel memberships. Safe to
    /// call more than once; later calls return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `SessionError::Registry` if either registry reports corruption
    pub fn detach(&mut self) -> Result<Option<Detached>, SessionError> {
        match self.state {
            SessionState::Attached => {},
            SessionState::Connecting => {
                self.state = SessionState::Detached;
                return Ok(None);
            },
            SessionState::Detached => {
                tracing::debug!(connection_id = %self.connection_id, "detach of detached session");
                return Ok(None);
            },
        }
        self.state = SessionState::Detached;

        let Some(detached) = self.hub.connections().detach(&self.connection_id)? else {
            return Ok(None);
        };
        let left = self.hub.channels().leave_all(&self.connection_id)?;
        for channel in &left {
            self.notify_members(&detached.user_id, channel, MembershipStatus::Left);
        }

        if detached.last_for_user && self.hub.config().announce_presence {
            self.announce(&detached.user_id, PresenceStatus::Offline, None);
        }

        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %detached.user_id,
            channels_left = left.len(),
            last_for_user = detached.last_for_user,
            "connection detached"
        );

        Ok(Some(detached))
    }

    fn attached_user(&self) -> Result<UserId, SessionError> {
        match (self.state, &self.user_id) {
            (SessionState::Attached, Some(user_id)) => Ok(user_id.clone()),
            (SessionState::Detached, _) => {
                tracing::debug!(connection_id = %self.connection_id, "command on detached session");
                Err(SessionError::Stale(self.connection_id.clone()))
            },
            _ => Err(SessionError::NotAttached),
        }
    }

    fn dispatch(
        &self,
        user_id: &UserId,
        command: Command,
    ) -> Result<CommandOutcome, SessionError> {
        match command {
            Command::Subscribe { channel } => self.subscribe(user_id, ChannelName::from(channel)),
            Command::Unsubscribe { channel } => {
                Ok(self.unsubscribe(user_id, ChannelName::from(channel)))
            },
            Command::SendToUser { to, message, data } => {
                let event = Event::Message(DirectMessage {
                    from: user_id.to_string(),
                    to: to.clone(),
                    message,
                    data,
                    timestamp: self.env.timestamp(),
                });
                let target = Target::User(UserId::from(to));
                let result = self.hub.router().deliver(&target, event, None);
                Ok(CommandOutcome::Delivered(result))
            },
            Command::Broadcast { channel, message, data } => {
                let channel = ChannelName::from(channel);
                let config = self.hub.config();
                if config.broadcast_requires_membership
                    && !self.hub.channels().is_member(&channel, &self.connection_id)
                {
                    return Ok(self.reject(
                        ErrorCode::NotSubscribed,
                        format!("not subscribed to channel {channel}"),
                        Some("broadcast"),
                    ));
                }

                let exclude = (!config.echo_broadcasts).then_some(&self.connection_id);
                let event = Event::Broadcast(ChannelMessage {
                    from: user_id.to_string(),
                    channel: channel.to_string(),
                    message,
                    data,
                    timestamp: self.env.timestamp(),
                });
                let result = self.hub.router().deliver(&Target::Channel(channel), event, exclude);
                Ok(CommandOutcome::Delivered(result))
            },
            Command::Typing { channel, active } => {
                let event = Event::Typing(TypingNotice {
                    from: user_id.to_string(),
                    channel: channel.clone(),
                    active,
                    timestamp: self.env.timestamp(),
                });
                let result = self.hub.router().deliver(
                    &Target::Channel(ChannelName::from(channel)),
                    event,
                    Some(&self.connection_id),
                );
                Ok(CommandOutcome::Delivered(result))
            },
            Command::Status => {
                let channels = self
                    .hub
                    .channels()
                    .channels_of(&self.connection_id)
                    .into_iter()
                    .map(ChannelName::into_string)
                    .collect();
                self.reply(Event::Status(StatusReport {
                    connection_id: self.connection_id.to_string(),
                    user_id: user_id.to_string(),
                    channels,
                    stats: self.hub.stats(),
                    timestamp: self.env.timestamp(),
                }));
                Ok(CommandOutcome::Replied)
            },
            Command::Ping => {
                self.reply(Event::Pong(Pong { timestamp: self.env.timestamp() }));
                Ok(CommandOutcome::Replied)
            },
        }
    }

    fn subscribe(
        &self,
        user_id: &UserId,
        channel: ChannelName,
    ) -> Result<CommandOutcome, SessionError> {
        let channels = self.hub.channels();
        let limit = self.hub.config().max_subscriptions_per_connection;

        if !channels.is_member(&channel, &self.connection_id)
            && channels.subscription_count(&self.connection_id) >= limit
        {
            return Ok(self.reject(
                ErrorCode::SubscriptionLimit,
                format!("subscription limit of {limit} channels reached"),
                Some("subscribe"),
            ));
        }

        let joined = channels.join(&channel, &self.connection_id)?;
        tracing::debug!(
            connection_id = %self.connection_id,
            channel = %channel,
            joined,
            "subscribe"
        );
        if joined {
            self.notify_members(user_id, &channel, MembershipStatus::Joined);
        }

        self.reply(Event::Subscribed(ChannelAck {
            channel: channel.into_string(),
            timestamp: self.env.timestamp(),
        }));
        Ok(CommandOutcome::Replied)
    }

    fn unsubscribe(&self, user_id: &UserId, channel: ChannelName) -> CommandOutcome {
        let left = self.hub.channels().leave(&channel, &self.connection_id);
        tracing::debug!(
            connection_id = %self.connection_id,
            channel = %channel,
            left,
            "unsubscribe"
        );
        if left {
            self.notify_members(user_id, &channel, MembershipStatus::Left);
        }

        self.reply(Event::Unsubscribed(ChannelAck {
            channel: channel.into_string(),
            timestamp: self.env.timestamp(),
        }));
        CommandOutcome::Replied
    }

    /// Push a presence notice to every live connection except `exclude`.
    ///
    /// Best-effort across connections: the first/last decision is made under
    /// the connection registry lock, but the notice goes out after it is
    /// released. When one user attaches and detaches on different threads at
    /// once, observers may see `offline` after the newer `online`.
    fn announce(
        &self,
        user_id: &UserId,
        status: PresenceStatus,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryResult {
        let event = Event::Presence(PresenceNotice {
            user_id: user_id.to_string(),
            status,
            timestamp: self.env.timestamp(),
        });
        self.hub.router().deliver(&Target::Everyone, event, exclude)
    }

    /// Tell the other members of `channel` that this connection joined or
    /// left. No-op unless membership announcements are enabled.
    fn notify_members(&self, user_id: &UserId, channel: &ChannelName, status: MembershipStatus) {
        if !self.hub.config().announce_membership {
            return;
        }
        let event = Event::Membership(MembershipNotice {
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            status,
            timestamp: self.env.timestamp(),
        });
        let target = Target::Channel(channel.clone());
        self.hub.router().deliver(&target, event, Some(&self.connection_id));
    }

    fn reject(&self, code: ErrorCode, message: String, command: Option<&str>) -> CommandOutcome {
        self.hub.record_caller_error();
        tracing::debug!(
            connection_id = %self.connection_id,
            code = code.as_str(),
            command = ?command,
            message = %message,
            "command rejected"
        );

        self.reply(Event::Error(ErrorReply {
            code,
            message,
            command: command.map(str::to_string),
            timestamp: self.env.timestamp(),
        }));
        CommandOutcome::Rejected(code)
    }

    fn reply(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.transport.send(Arc::new(event)) {
            tracing::debug!(
                connection_id = %self.connection_id,
                event = name,
                error = %e,
                "reply refused"
            );
        }
    }
}
