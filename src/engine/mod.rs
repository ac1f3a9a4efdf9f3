//! Media engine model
//!
//! The process-level media layer: a pool of isolated engine workers, one
//! codec-aware router per worker, and the transport/producer/consumer
//! handles allocated through them. Everything above this module (rooms,
//! signaling) orchestrates these handles; everything below the transports
//! (actual packet I/O) happens out of band from the signaling channel.
//!
//! ```text
//!   WorkerPool ── round robin ──► Worker ──► Router
//!                                              │ create_transport()
//!                                              ▼
//!                        Transport (ICE/DTLS, send | recv)
//!                          │ produce              │ consume
//!                          ▼                      ▼
//!                        Producer ─ broadcast ─► Consumer*
//! ```

pub mod consumer;
pub mod producer;
pub mod router;
pub mod rtp;
pub mod transport;
pub mod worker;

pub use consumer::Consumer;
pub use producer::Producer;
pub use router::Router;
pub use rtp::{MediaKind, RtpCapabilities, RtpCodec, RtpParameters};
pub use transport::{
    BitrateHints, DtlsParameters, DtlsRole, DtlsState, IceCandidate, IceParameters, Transport,
    TransportDirection,
};
pub use worker::{EngineError, EngineSettings, Worker, WorkerPool};
