//! Local negotiation context
//!
//! A device is loaded once per session from the server-provided router
//! capabilities. It answers what the session can produce and consume and
//! holds the local DTLS identity used to connect transports.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

use crate::engine::{
    DtlsParameters, DtlsRole, MediaKind, RtpCapabilities, RtpParameters,
};

/// Client-side negotiation context
pub struct Device {
    router_capabilities: RtpCapabilities,
    dtls_parameters: DtlsParameters,
    next_ssrc: AtomicU32,
}

impl Device {
    /// Load a device from router capabilities
    pub fn load(router_capabilities: RtpCapabilities) -> Self {
        Self {
            router_capabilities,
            dtls_parameters: DtlsParameters::generate(DtlsRole::Client),
            next_ssrc: AtomicU32::new(rand::thread_rng().gen_range(1..=0x7fff_ffff)),
        }
    }

    /// Receive capabilities presented when consuming
    pub fn rtp_capabilities(&self) -> &RtpCapabilities {
        &self.router_capabilities
    }

    /// Local DTLS identity presented when connecting transports
    pub fn dtls_parameters(&self) -> &DtlsParameters {
        &self.dtls_parameters
    }

    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.router_capabilities.preferred_codec(kind).is_some()
    }

    /// Track parameters for producing the given kind, using the router's
    /// preferred codec and a fresh SSRC
    pub fn producer_parameters(&self, kind: MediaKind) -> Option<RtpParameters> {
        let codec = self.router_capabilities.preferred_codec(kind)?.clone();
        let ssrc = self.next_ssrc.fetch_add(1, Ordering::Relaxed);
        Some(RtpParameters::for_codec(codec, ssrc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_produces_both_kinds() {
        let device = Device::load(RtpCapabilities::supported());

        assert!(device.can_produce(MediaKind::Audio));
        assert!(device.can_produce(MediaKind::Video));

        let audio = device.producer_parameters(MediaKind::Audio).unwrap();
        let video = device.producer_parameters(MediaKind::Video).unwrap();
        assert_ne!(audio.ssrc, video.ssrc);
        assert_eq!(audio.kind(), Some(MediaKind::Audio));
    }

    #[test]
    fn test_empty_capabilities_produce_nothing() {
        let device = Device::load(RtpCapabilities::default());

        assert!(!device.can_produce(MediaKind::Audio));
        assert!(device.producer_parameters(MediaKind::Video).is_none());
    }
}
