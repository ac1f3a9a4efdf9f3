//! Media producers
//!
//! A producer is the server-side handle for one inbound track. Samples it
//! ingests fan out through a broadcast channel shared by every consumer of
//! the track; `bytes::Bytes` keeps the fan-out reference-counted rather
//! than copied.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::rtp::{MediaKind, RtpParameters};

/// Buffered samples per consumer before a slow consumer starts lagging
const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Server-side handle for one inbound media track
pub struct Producer {
    id: Uuid,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    transport_id: Uuid,
    samples: broadcast::Sender<Bytes>,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl Producer {
    pub fn new(kind: MediaKind, rtp_parameters: RtpParameters, transport_id: Uuid) -> Self {
        let (samples, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            kind,
            rtp_parameters,
            transport_id,
            samples,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    pub fn transport_id(&self) -> Uuid {
        self.transport_id
    }

    /// Ingest one sample, fanning it out to every subscribed consumer.
    ///
    /// Returns the number of consumers that received it; paused or closed
    /// producers drop samples silently.
    pub fn send(&self, sample: Bytes) -> usize {
        if self.paused.load(Ordering::Relaxed) || self.is_closed() {
            return 0;
        }
        self.samples.send(sample).unwrap_or(0)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.samples.subscribe()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Mark the producer closed. Dependent consumers are closed by the
    /// media manager's cascade, not from here.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(producer = %self.id, kind = %self.kind, "Producer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rtp::{RtpCapabilities, RtpParameters};

    fn audio_producer() -> Producer {
        let codec = RtpCapabilities::supported()
            .preferred_codec(MediaKind::Audio)
            .unwrap()
            .clone();
        Producer::new(
            MediaKind::Audio,
            RtpParameters::for_codec(codec, 1111),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_fan_out() {
        let producer = audio_producer();
        let mut a = producer.subscribe();
        let mut b = producer.subscribe();

        let delivered = producer.send(Bytes::from_static(b"opus frame"));
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"opus frame"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"opus frame"));
    }

    #[tokio::test]
    async fn test_paused_producer_drops_samples() {
        let producer = audio_producer();
        let _rx = producer.subscribe();

        producer.pause();
        assert_eq!(producer.send(Bytes::from_static(b"x")), 0);

        producer.resume();
        assert_eq!(producer.send(Bytes::from_static(b"x")), 1);
    }

    #[tokio::test]
    async fn test_closed_producer_drops_samples() {
        let producer = audio_producer();
        let _rx = producer.subscribe();

        producer.close();
        assert!(producer.is_closed());
        assert_eq!(producer.send(Bytes::from_static(b"x")), 0);
    }
}
