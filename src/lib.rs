//! # aula
//!
//! Live lecture broadcasting core: the media relay and signaling
//! subsystem of an e-learning platform. One broadcaster produces audio
//! and video into a room; any number of viewers consume it live.
//!
//! The surrounding marketplace (catalog, checkout, lecture scheduling) is
//! a separate application; it mints the opaque room tokens this crate
//! trusts as room identities and is reached only through the
//! [`session::LectureLifecycle`] hooks.
//!
//! # Architecture
//!
//! ```text
//!   Broadcaster ──┐                         ┌── Viewer
//!   (produce)     │   WebSocket signaling   │   (consume)
//!                 ▼   request/ack + push    ▼
//!            ┌─────────────────────────────────┐
//!            │          SignalingServer        │
//!            │                │                │
//!            │              Relay              │
//!            │   rooms · transports · media    │
//!            │                │                │
//!            │        WorkerPool (round        │
//!            │        robin media engines)     │
//!            └─────────────────────────────────┘
//!                 media flows out of band over
//!                 the negotiated ICE/DTLS transports
//! ```
//!
//! # Server
//!
//! ```no_run
//! use aula::signaling::{ServerConfig, SignalingServer};
//!
//! # async fn example() -> aula::error::Result<()> {
//! let server = SignalingServer::new(ServerConfig::from_env()?)?;
//! server.run().await
//! # }
//! ```
//!
//! # Client
//!
//! ```no_run
//! use std::sync::Arc;
//! use aula::session::{Broadcaster, NoopLifecycle, SessionConfig, SyntheticSource};
//!
//! # async fn example() -> aula::error::Result<()> {
//! let mut broadcaster = Broadcaster::new(
//!     SessionConfig::new("ws://127.0.0.1:4443"),
//!     Arc::new(SyntheticSource),
//!     Arc::new(NoopLifecycle),
//! );
//! let room_token = broadcaster.go_live("lecture-42").await?;
//! # let _ = room_token;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod relay;
pub mod session;
pub mod signaling;

pub use error::{Error, Result};
