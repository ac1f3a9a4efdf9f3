//! Producer/consumer manager
//!
//! Owns every live producer and consumer, the ownership indexes used for
//! disconnect cleanup, and the producer-closure cascade: closing a
//! producer closes every consumer referencing it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::{Consumer, MediaKind, Producer, RtpCapabilities, RtpParameters};

use super::error::RelayError;

struct ProducerRecord {
    producer: Arc<Producer>,
    connection_id: u64,
    room_id: String,
}

struct ConsumerRecord {
    consumer: Arc<Consumer>,
    connection_id: u64,
}

/// A producer that has just been closed, with the context needed to
/// notify its room
#[derive(Debug, Clone)]
pub struct ClosedProducer {
    pub id: Uuid,
    pub room_id: String,
    pub connection_id: u64,
}

/// Registry of live producers and consumers
pub struct MediaManager {
    producers: RwLock<HashMap<Uuid, ProducerRecord>>,
    consumers: RwLock<HashMap<Uuid, ConsumerRecord>>,
    /// Consumer ids per source producer, for the closure cascade
    by_producer: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl MediaManager {
    pub fn new() -> Self {
        Self {
            producers: RwLock::new(HashMap::new()),
            consumers: RwLock::new(HashMap::new()),
            by_producer: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new producer on a send transport
    pub async fn create_producer(
        &self,
        connection_id: u64,
        room_id: &str,
        transport_id: Uuid,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Arc<Producer> {
        let producer = Arc::new(Producer::new(kind, rtp_parameters, transport_id));

        tracing::info!(
            producer = %producer.id(),
            connection = connection_id,
            room = room_id,
            %kind,
            "Producer created"
        );

        self.producers.write().await.insert(
            producer.id(),
            ProducerRecord {
                producer: Arc::clone(&producer),
                connection_id,
                room_id: room_id.to_string(),
            },
        );

        producer
    }

    pub async fn get_producer(&self, producer_id: Uuid) -> Result<Arc<Producer>, RelayError> {
        let producers = self.producers.read().await;
        producers
            .get(&producer_id)
            .filter(|record| !record.producer.is_closed())
            .map(|record| Arc::clone(&record.producer))
            .ok_or(RelayError::ProducerNotFound(producer_id))
    }

    /// Create a consumer against `producer`, validated against the
    /// consuming device's receive capabilities. The consumer is created
    /// paused and resumed once registration completes.
    pub async fn create_consumer(
        &self,
        connection_id: u64,
        transport_id: Uuid,
        producer: &Producer,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<Consumer>, RelayError> {
        if !rtp_capabilities.can_consume(producer.rtp_parameters()) {
            return Err(RelayError::IncompatibleCapabilities {
                producer: producer.id(),
            });
        }

        let consumer = Arc::new(Consumer::new(producer, transport_id));

        self.consumers.write().await.insert(
            consumer.id(),
            ConsumerRecord {
                consumer: Arc::clone(&consumer),
                connection_id,
            },
        );
        self.by_producer
            .write()
            .await
            .entry(producer.id())
            .or_default()
            .push(consumer.id());

        consumer.resume();

        tracing::info!(
            consumer = %consumer.id(),
            producer = %producer.id(),
            connection = connection_id,
            kind = %consumer.kind(),
            "Consumer created"
        );

        Ok(consumer)
    }

    /// Close a producer and cascade-close every consumer referencing it
    pub async fn close_producer(&self, producer_id: Uuid) -> Option<ClosedProducer> {
        let record = self.producers.write().await.remove(&producer_id)?;
        record.producer.close();

        let dependents = self
            .by_producer
            .write()
            .await
            .remove(&producer_id)
            .unwrap_or_default();

        if !dependents.is_empty() {
            let mut consumers = self.consumers.write().await;
            for consumer_id in &dependents {
                if let Some(consumer) = consumers.remove(consumer_id) {
                    consumer.consumer.close();
                }
            }
            tracing::info!(
                producer = %producer_id,
                consumers = dependents.len(),
                "Producer closure cascaded"
            );
        }

        Some(ClosedProducer {
            id: producer_id,
            room_id: record.room_id,
            connection_id: record.connection_id,
        })
    }

    /// Close one consumer without touching its producer
    pub async fn close_consumer(&self, consumer_id: Uuid) {
        if let Some(record) = self.consumers.write().await.remove(&consumer_id) {
            record.consumer.close();
            self.by_producer
                .write()
                .await
                .entry(record.consumer.producer_id())
                .or_default()
                .retain(|id| *id != consumer_id);
        }
    }

    /// Best-effort cleanup of everything a disconnecting connection owns.
    ///
    /// Returns the closed producers so the caller can notify their rooms.
    pub async fn close_for_connection(&self, connection_id: u64) -> Vec<ClosedProducer> {
        let consumer_ids: Vec<Uuid> = {
            let consumers = self.consumers.read().await;
            consumers
                .iter()
                .filter(|(_, record)| record.connection_id == connection_id)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in consumer_ids {
            self.close_consumer(id).await;
        }

        let producer_ids: Vec<Uuid> = {
            let producers = self.producers.read().await;
            producers
                .iter()
                .filter(|(_, record)| record.connection_id == connection_id)
                .map(|(id, _)| *id)
                .collect()
        };

        let mut closed = Vec::with_capacity(producer_ids.len());
        for id in producer_ids {
            if let Some(info) = self.close_producer(id).await {
                closed.push(info);
            }
        }
        closed
    }

    /// Producers a connection currently has live in one room
    pub async fn producers_for_connection(&self, connection_id: u64, room_id: &str) -> Vec<Uuid> {
        let producers = self.producers.read().await;
        producers
            .iter()
            .filter(|(_, record)| {
                record.connection_id == connection_id && record.room_id == room_id
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn producer_count(&self) -> usize {
        self.producers.read().await.len()
    }

    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }
}

impl Default for MediaManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(kind: MediaKind) -> RtpParameters {
        let codec = RtpCapabilities::supported()
            .preferred_codec(kind)
            .unwrap()
            .clone();
        RtpParameters::for_codec(codec, 42)
    }

    #[tokio::test]
    async fn test_producer_close_cascades_to_consumers() {
        let manager = MediaManager::new();
        let producer = manager
            .create_producer(1, "abc123", Uuid::new_v4(), MediaKind::Video, parameters(MediaKind::Video))
            .await;

        let caps = RtpCapabilities::supported();
        let a = manager
            .create_consumer(2, Uuid::new_v4(), &producer, &caps)
            .await
            .unwrap();
        let b = manager
            .create_consumer(3, Uuid::new_v4(), &producer, &caps)
            .await
            .unwrap();

        let closed = manager.close_producer(producer.id()).await.unwrap();
        assert_eq!(closed.room_id, "abc123");

        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(manager.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn test_consumer_created_paused_then_resumed() {
        let manager = MediaManager::new();
        let producer = manager
            .create_producer(1, "abc123", Uuid::new_v4(), MediaKind::Audio, parameters(MediaKind::Audio))
            .await;

        let consumer = manager
            .create_consumer(2, Uuid::new_v4(), &producer, &RtpCapabilities::supported())
            .await
            .unwrap();

        // Resumed by the time creation returns
        assert!(!consumer.is_paused());
    }

    #[tokio::test]
    async fn test_capability_mismatch_is_rejected() {
        let manager = MediaManager::new();
        let producer = manager
            .create_producer(1, "abc123", Uuid::new_v4(), MediaKind::Video, parameters(MediaKind::Video))
            .await;

        let audio_only = RtpCapabilities {
            codecs: RtpCapabilities::supported()
                .codecs
                .into_iter()
                .filter(|c| c.kind == MediaKind::Audio)
                .collect(),
        };

        let result = manager
            .create_consumer(2, Uuid::new_v4(), &producer, &audio_only)
            .await;
        assert!(matches!(
            result,
            Err(RelayError::IncompatibleCapabilities { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cleanup_reports_closed_producers() {
        let manager = MediaManager::new();
        let p1 = manager
            .create_producer(1, "abc123", Uuid::new_v4(), MediaKind::Audio, parameters(MediaKind::Audio))
            .await;
        let _p2 = manager
            .create_producer(2, "abc123", Uuid::new_v4(), MediaKind::Video, parameters(MediaKind::Video))
            .await;

        let closed = manager.close_for_connection(1).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, p1.id());
        assert_eq!(manager.producer_count().await, 1);
    }
}
