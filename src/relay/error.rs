//! Relay error types
//!
//! Every variant here is a client-addressable failure: the signaling
//! server turns it into a structured acknowledgement error rather than a
//! server fault. Engine death is the one exception and is reported through
//! the worker pool's fatal watch instead.

use uuid::Uuid;

use crate::engine::{EngineError, TransportDirection};

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Unknown room token
    RoomNotFound(String),
    /// Stale or unknown transport id, or a transport owned by another
    /// connection
    TransportNotFound(Uuid),
    /// Stale or unknown producer id
    ProducerNotFound(Uuid),
    /// Produce on a recv transport, or consume on a send transport
    WrongTransportDirection {
        expected: TransportDirection,
        actual: TransportDirection,
    },
    /// The consuming device cannot handle the producer's codec
    IncompatibleCapabilities { producer: Uuid },
    /// DTLS connect on a transport that is not freshly created
    InvalidDtlsState,
    /// The connection already joined a room
    AlreadyJoined(String),
    /// The request requires room membership
    NotInRoom,
    /// The media engine refused or is gone
    Engine(EngineError),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::RoomNotFound(room) => write!(f, "Room not found: {}", room),
            RelayError::TransportNotFound(id) => write!(f, "Transport not found: {}", id),
            RelayError::ProducerNotFound(id) => write!(f, "Producer not found: {}", id),
            RelayError::WrongTransportDirection { expected, actual } => {
                write!(f, "Expected a {} transport, got {}", expected, actual)
            }
            RelayError::IncompatibleCapabilities { producer } => {
                write!(f, "Device cannot consume producer {}", producer)
            }
            RelayError::InvalidDtlsState => write!(f, "Transport is not connectable"),
            RelayError::AlreadyJoined(room) => write!(f, "Already joined room: {}", room),
            RelayError::NotInRoom => write!(f, "Not joined to any room"),
            RelayError::Engine(e) => write!(f, "Engine error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<EngineError> for RelayError {
    fn from(e: EngineError) -> Self {
        RelayError::Engine(e)
    }
}
