//! Client session controllers
//!
//! The two sides of a live lecture share the same negotiation primitives
//! (signaling client, device) and differ in what they do with them:
//!
//! - [`Broadcaster`]: capture local tracks, produce them, end the lecture
//! - [`Viewer`]: consume whatever is or becomes live, survive drops with
//!   a bounded reconnect loop
//!
//! The scheduling collaborator's REST hooks sit behind
//! [`LectureLifecycle`]; capture hardware sits behind [`MediaSource`].

pub mod broadcaster;
pub mod client;
pub mod config;
pub mod device;
pub mod lifecycle;
pub mod source;
pub mod state;
pub mod viewer;

pub use broadcaster::{Broadcaster, LocalProducer};
pub use client::{SessionEvent, SignalingClient};
pub use config::SessionConfig;
pub use device::Device;
pub use lifecycle::{LectureLifecycle, NoopLifecycle};
pub use source::{LocalTrack, MediaSource, SyntheticSource, UnavailableSource};
pub use state::{ViewerPhase, ViewerStateMachine};
pub use viewer::{RemoteTrack, Viewer};
