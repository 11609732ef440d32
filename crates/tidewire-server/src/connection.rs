//! One WebSocket connection, from upgrade to detach.
//!
//! Each connection runs two tasks. The writer drains the connection's
//! outbound queue into the socket and sends heartbeat pings. The reader (this
//! task) feeds inbound frames to the [`HubSession`] and checks the idle
//! timeout. Detach always runs when the reader stops, whatever the reason.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tidewire_core::{CommandOutcome, Environment, Hub, HubSession, QueueTransport, SessionError};
use tidewire_proto::Event;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    ServerRuntimeConfig,
    error::ServerError,
    identity::IdentityResolver,
    system_env::SystemEnv,
    transport::{self, WsStream},
};

/// How long the writer may keep flushing after the session detached.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Everything a connection task needs, shared by all of them.
pub(crate) struct ConnectionContext {
    pub(crate) hub: Arc<Hub>,
    pub(crate) env: SystemEnv,
    pub(crate) config: ServerRuntimeConfig,
    pub(crate) identity: Arc<dyn IdentityResolver>,
}

/// Upgrade, attach, pump frames until the peer leaves or idles out, detach.
pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
) -> Result<(), ServerError> {
    let (ws, user_id) = transport::upgrade(stream, ctx.identity.as_ref()).await?;
    let (sink, mut inbound) = ws.split();

    let (queue, outbound) = QueueTransport::channel(ctx.config.outbound_queue_capacity);
    let queue = Arc::new(queue);
    let writer = tokio::spawn(write_loop(sink, outbound, ctx.config.heartbeat_interval));

    let mut session = HubSession::new(Arc::clone(&ctx.hub), ctx.env, queue.clone())
        .with_max_command_bytes(ctx.config.max_message_bytes);

    tracing::debug!(
        peer = %peer,
        connection_id = %session.connection_id(),
        user_id = %user_id,
        "upgrade accepted"
    );

    let result = match session.attach(user_id) {
        Ok(_) => read_loop(&mut session, &mut inbound, &ctx).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = session.detach() {
        tracing::error!(connection_id = %session.connection_id(), error = %e, "detach failed");
    }

    tracing::debug!(
        connection_id = %session.connection_id(),
        dropped = queue.dropped(),
        "connection closed"
    );

    // Dropping the last senders ends the writer once the queue is flushed.
    drop(session);
    drop(queue);
    finish_writer(writer).await;

    result
}

async fn read_loop(
    session: &mut HubSession<SystemEnv>,
    inbound: &mut SplitStream<WsStream>,
    ctx: &ConnectionContext,
) -> Result<(), ServerError> {
    let mut idle_check = tokio::time::interval(ctx.config.heartbeat_interval);

    loop {
        tokio::select! {
            frame = inbound.next() => {
                let outcome = match frame {
                    Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => session.handle_binary(data.len()),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        session.touch();
                        continue;
                    },
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => {
                        tracing::debug!(
                            connection_id = %session.connection_id(),
                            error = %e,
                            "read failed"
                        );
                        return Ok(());
                    },
                };
                settle(session, outcome)?;
            },
            _ = idle_check.tick() => {
                if let Err(e) = session.tick(ctx.env.now()) {
                    tracing::info!(
                        connection_id = %session.connection_id(),
                        error = %e,
                        "closing idle connection"
                    );
                    return Ok(());
                }
            },
        }
    }
}

/// Log a command outcome; only fatal session errors end the connection.
fn settle(
    session: &HubSession<SystemEnv>,
    outcome: Result<CommandOutcome, SessionError>,
) -> Result<(), SessionError> {
    match outcome {
        Ok(CommandOutcome::Rejected(code)) => {
            tracing::debug!(
                connection_id = %session.connection_id(),
                code = code.as_str(),
                "command rejected"
            );
            Ok(())
        },
        Ok(_) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(
                connection_id = %session.connection_id(),
                error = %e,
                "command ignored"
            );
            Ok(())
        },
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::Receiver<Arc<Event>>,
    heartbeat: Duration,
) {
    let mut ping = tokio::time::interval(heartbeat);
    ping.tick().await;

    loop {
        let message = tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match event.encode() {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(event = event.name(), error = %e, "event encoding failed");
                        continue;
                    },
                }
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!(error = %e, "write failed");
            return;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::trace!(error = %e, "close after drain failed");
    }
}

async fn finish_writer(writer: JoinHandle<()>) {
    let abort = writer.abort_handle();
    match tokio::time::timeout(CLOSE_GRACE, writer).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => tracing::warn!(error = %e, "writer task failed"),
        Err(_) => {
            abort.abort();
            tracing::debug!("writer did not drain in time");
        },
    }
}
