//! TCP listener and WebSocket upgrade.
//!
//! Accepts plain TCP connections and performs the WebSocket handshake,
//! resolving the user identity from the upgrade request. Requests without an
//! identity are answered with HTTP 401 and never reach the hub. TLS is left
//! to a terminating proxy in front of the server.

use std::net::SocketAddr;

use tidewire_core::UserId;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
    },
};

use crate::{error::ServerError, identity::IdentityResolver};

/// WebSocket stream over a plain TCP socket.
pub type WsStream = WebSocketStream<TcpStream>;

/// Listening socket for WebSocket upgrades.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Bind to `address` (e.g. `"0.0.0.0:8080"`, or port 0 for any port).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(addr = %addr, "WebSocket listener bound");

        Ok(Self { listener })
    }

    /// Accept the next TCP connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Complete the WebSocket handshake and resolve the connecting user.
///
/// # Errors
///
/// - `ServerError::Unauthorized` if `resolver` finds no identity (the peer
///   receives HTTP 401)
/// - `ServerError::Transport` if the handshake itself fails
pub async fn upgrade(
    stream: TcpStream,
    resolver: &dyn IdentityResolver,
) -> Result<(WsStream, UserId), ServerError> {
    let mut identity = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match resolver.resolve(request) {
            Some(user_id) => {
                identity = Some(user_id);
                Ok(response)
            },
            None => Err(unauthorized()),
        }
    };

    let handshake = tokio_tungstenite::accept_hdr_async(stream, callback).await;
    let ws = match handshake {
        Ok(ws) => ws,
        Err(_) if identity.is_none() => return Err(ServerError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let user_id = identity.ok_or(ServerError::Unauthorized)?;
    Ok((ws, user_id))
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("missing user identity".to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}
