//! Signaling server listener
//!
//! Accepts WebSocket connections, enforces the origin allow-list during
//! the handshake, assigns session ids and spawns one handler task per
//! connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::error::Result;
use crate::relay::Relay;

use super::config::ServerConfig;
use super::connection::Connection;

/// The signaling server
pub struct SignalingServer {
    config: ServerConfig,
    relay: Arc<Relay>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SignalingServer {
    /// Create a server, initializing the media engine pool
    pub fn new(config: ServerConfig) -> Result<Self> {
        let relay = Relay::new(config.worker_pool_size, config.engine.clone())?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            relay: Arc::new(relay),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// The relay behind this server
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Bind the configured address and serve until shut down
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Signaling server listening");
        self.accept_loop(listener).await
    }

    /// Serve on an already-bound listener (lets tests bind port 0)
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Signaling server listening");
        }
        self.accept_loop(listener).await
    }

    /// Run until `shutdown` resolves, then stop the engine pool
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Signaling server listening");

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(listener) => result,
        };

        self.relay.shutdown();
        result
    }

    async fn accept_loop(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let _permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id, peer = %peer_addr, "New connection");

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let config = self.config.clone();
        let relay = Arc::clone(&self.relay);

        tokio::spawn(async move {
            // Keep the permit for the life of the connection
            let _permit = _permit;

            let ws = match tokio_tungstenite::accept_hdr_async(
                socket,
                |request: &Request, response: Response| check_origin(&config, request, response),
            )
            .await
            {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(session_id, error = %e, "Handshake failed");
                    return;
                }
            };

            let connection = Connection::new(session_id, peer_addr, relay);
            if let Err(e) = connection.run(ws).await {
                tracing::debug!(session_id, error = %e, "Connection error");
            }
            tracing::debug!(session_id, "Connection closed");
        });
    }

    /// The address the server is configured to bind
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

fn check_origin(
    config: &ServerConfig,
    request: &Request,
    response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    let origin = request
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok());

    if config.origin_allowed(origin) {
        Ok(response)
    } else {
        tracing::warn!(?origin, "Handshake rejected: origin not allowed");
        let mut reject = ErrorResponse::new(Some("origin not allowed".into()));
        *reject.status_mut() = StatusCode::FORBIDDEN;
        Err(reject)
    }
}
