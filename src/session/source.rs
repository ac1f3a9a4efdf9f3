//! Local media capture seam
//!
//! The session controllers never talk to capture hardware directly; they
//! ask a [`MediaSource`] for track handles. Production builds plug in a
//! real camera/microphone backend, tests and demos use the synthetic one.

use crate::engine::MediaKind;
use crate::error::{Error, Result};

/// A captured local track, ready to be produced
#[derive(Debug, Clone)]
pub struct LocalTrack {
    pub kind: MediaKind,
    pub label: String,
}

/// Provider of local tracks
pub trait MediaSource: Send + Sync {
    /// Capture the tracks this source offers
    fn capture(&self) -> Result<Vec<LocalTrack>>;
}

/// Synthetic microphone + camera pair
pub struct SyntheticSource;

impl MediaSource for SyntheticSource {
    fn capture(&self) -> Result<Vec<LocalTrack>> {
        Ok(vec![
            LocalTrack {
                kind: MediaKind::Audio,
                label: "synthetic-mic".into(),
            },
            LocalTrack {
                kind: MediaKind::Video,
                label: "synthetic-camera".into(),
            },
        ])
    }
}

/// A source with no devices attached; every capture fails
pub struct UnavailableSource;

impl MediaSource for UnavailableSource {
    fn capture(&self) -> Result<Vec<LocalTrack>> {
        Err(Error::Capture("no capture devices available".into()))
    }
}
