//! Signaling layer
//!
//! A persistent WebSocket per client carrying a small RPC vocabulary:
//! every client request is acknowledged exactly once (success payload or
//! structured error), and the server pushes unsolicited events to
//! connections joined to a room.
//!
//! Per-connection state machine:
//!
//! ```text
//!   connected ──joinRoom──► in-room ──{produce | consume}*──► …
//!       │                                                      │
//!       └───────────────── disconnect / cleanup ◄──────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod message;
pub mod server;

pub use config::ServerConfig;
pub use message::{
    ConsumerData, PushEvent, Request, RequestBody, ResponsePayload, ServerMessage,
    TransportDescriptor,
};
pub use server::SignalingServer;
