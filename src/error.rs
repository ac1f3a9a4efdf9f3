//! Crate-level error types
//!
//! Server-side orchestration errors live in [`crate::relay::RelayError`];
//! this module defines the top-level error surfaced by the signaling server
//! and the client session controllers.

use crate::relay::RelayError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept, socket configuration)
    Io(std::io::Error),
    /// WebSocket-level error on the signaling channel
    WebSocket(tokio_tungstenite::tungstenite::Error),
    /// Malformed signaling payload
    Json(serde_json::Error),
    /// Server-side relay error
    Relay(RelayError),
    /// The server acknowledged a request with a structured error
    Rejected(String),
    /// A reply did not match the request that produced it
    Protocol(String),
    /// The signaling connection is gone
    ConnectionClosed,
    /// Local media capture failed
    Capture(String),
    /// Invalid or missing configuration value
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Json(e) => write!(f, "Invalid signaling payload: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::Rejected(msg) => write!(f, "Request rejected: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Error::ConnectionClosed => write!(f, "Signaling connection closed"),
            Error::Capture(msg) => write!(f, "Media capture failed: {}", msg),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Relay(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}
