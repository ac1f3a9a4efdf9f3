//! RTP codec capabilities and parameters
//!
//! The negotiation vocabulary shared between routers, producers, consumers
//! and client devices. A router advertises [`RtpCapabilities`]; a producer
//! is created with [`RtpParameters`] describing the track it ingests; a
//! consumer is only created when the consuming device's capabilities cover
//! the producer's codec.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Media kind of a track, producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single negotiable codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodec {
    /// MIME type, e.g. `audio/opus` or `video/VP8`
    pub mime_type: String,
    pub kind: MediaKind,
    /// Clock rate in Hz (48000 for Opus, 90000 for video)
    pub clock_rate: u32,
    /// Channel count, audio only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Codec-specific format parameters (e.g. H264 profile-level-id)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl RtpCodec {
    /// Two codecs match when MIME type and clock rate agree
    pub fn matches(&self, other: &RtpCodec) -> bool {
        self.mime_type.eq_ignore_ascii_case(&other.mime_type) && self.clock_rate == other.clock_rate
    }

    fn opus() -> Self {
        Self {
            mime_type: "audio/opus".into(),
            kind: MediaKind::Audio,
            clock_rate: 48_000,
            channels: Some(2),
            parameters: BTreeMap::from([("useinbandfec".into(), "1".into())]),
        }
    }

    fn vp8() -> Self {
        Self {
            mime_type: "video/VP8".into(),
            kind: MediaKind::Video,
            clock_rate: 90_000,
            channels: None,
            parameters: BTreeMap::new(),
        }
    }

    fn h264() -> Self {
        Self {
            mime_type: "video/H264".into(),
            kind: MediaKind::Video,
            clock_rate: 90_000,
            channels: None,
            parameters: BTreeMap::from([
                ("packetization-mode".into(), "1".into()),
                ("profile-level-id".into(), "42e01f".into()),
            ]),
        }
    }
}

/// Codec set a router (or device) can handle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    pub codecs: Vec<RtpCodec>,
}

impl RtpCapabilities {
    /// The fixed codec set every router is configured with: one audio
    /// codec (Opus) and two video codec profiles (VP8, H264).
    pub fn supported() -> Self {
        Self {
            codecs: vec![RtpCodec::opus(), RtpCodec::vp8(), RtpCodec::h264()],
        }
    }

    /// Whether these capabilities cover the given codec
    pub fn supports(&self, codec: &RtpCodec) -> bool {
        self.codecs.iter().any(|c| c.matches(codec))
    }

    /// Whether these capabilities can consume a track described by `params`
    pub fn can_consume(&self, params: &RtpParameters) -> bool {
        params.codecs.iter().all(|c| self.supports(c))
    }

    /// Preferred codec for a kind, if any
    pub fn preferred_codec(&self, kind: MediaKind) -> Option<&RtpCodec> {
        self.codecs.iter().find(|c| c.kind == kind)
    }
}

/// Parameters describing one produced (or consumed) track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    pub codecs: Vec<RtpCodec>,
    /// Synchronization source of the track
    pub ssrc: u32,
}

impl RtpParameters {
    /// Parameters for a single-codec track
    pub fn for_codec(codec: RtpCodec, ssrc: u32) -> Self {
        Self {
            codecs: vec![codec],
            ssrc,
        }
    }

    /// The track's media kind, taken from its first codec
    pub fn kind(&self) -> Option<MediaKind> {
        self.codecs.first().map(|c| c.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_codec_set() {
        let caps = RtpCapabilities::supported();

        assert_eq!(caps.codecs.len(), 3);
        assert_eq!(
            caps.codecs
                .iter()
                .filter(|c| c.kind == MediaKind::Audio)
                .count(),
            1
        );
        assert_eq!(
            caps.codecs
                .iter()
                .filter(|c| c.kind == MediaKind::Video)
                .count(),
            2
        );
    }

    #[test]
    fn test_codec_match_is_case_insensitive() {
        let mut vp8 = RtpCodec::vp8();
        vp8.mime_type = "video/vp8".into();

        assert!(RtpCapabilities::supported().supports(&vp8));
    }

    #[test]
    fn test_can_consume_rejects_unknown_codec() {
        let caps = RtpCapabilities {
            codecs: vec![RtpCodec::opus(), RtpCodec::vp8()],
        };
        let h264_track = RtpParameters::for_codec(RtpCodec::h264(), 1234);

        assert!(!caps.can_consume(&h264_track));
        assert!(caps.can_consume(&RtpParameters::for_codec(RtpCodec::vp8(), 99)));
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(RtpCapabilities::supported()).unwrap();
        let first = &json["codecs"][0];

        assert_eq!(first["mimeType"], "audio/opus");
        assert_eq!(first["clockRate"], 48_000);
    }
}
