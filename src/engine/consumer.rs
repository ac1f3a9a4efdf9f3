//! Media consumers
//!
//! A consumer is one outbound copy of a producer's track, bound to one
//! receive transport. Consumers are created paused and resumed once
//! creation has completed, so the first samples are not dropped while the
//! client is still wiring itself up. A consumer is void once its producer
//! closes.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::producer::Producer;
use super::rtp::{MediaKind, RtpParameters};

/// Server-side handle for one outbound copy of a producer's media
pub struct Consumer {
    id: Uuid,
    kind: MediaKind,
    producer_id: Uuid,
    transport_id: Uuid,
    rtp_parameters: RtpParameters,
    samples: Mutex<broadcast::Receiver<Bytes>>,
    paused: AtomicBool,
    closed: AtomicBool,
    closed_notify: Notify,
}

impl Consumer {
    /// Create a consumer against `producer`, initially paused.
    pub fn new(producer: &Producer, transport_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: producer.kind(),
            producer_id: producer.id(),
            transport_id,
            rtp_parameters: producer.rtp_parameters().clone(),
            samples: Mutex::new(producer.subscribe()),
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn producer_id(&self) -> Uuid {
        self.producer_id
    }

    pub fn transport_id(&self) -> Uuid {
        self.transport_id
    }

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
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

    /// Receive the next sample from the source producer.
    ///
    /// Returns `None` once the consumer is closed or the producer's
    /// channel is gone. Samples arriving while paused are skipped. A
    /// lagged consumer skips ahead rather than buffering indefinitely.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            if self.is_closed() {
                return None;
            }
            let mut rx = self.samples.lock().await;
            let result = tokio::select! {
                result = rx.recv() => result,
                _ = self.closed_notify.notified() => return None,
            };
            drop(rx);
            match result {
                Ok(sample) => {
                    if self.is_paused() {
                        continue;
                    }
                    return Some(sample);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(consumer = %self.id, skipped, "Consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Close the consumer; called directly or by the producer-closure
    /// cascade.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_notify.notify_waiters();
            tracing::debug!(
                consumer = %self.id,
                producer = %self.producer_id,
                "Consumer closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
