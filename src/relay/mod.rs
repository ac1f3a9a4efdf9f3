//! Server-side relay orchestration
//!
//! The [`Relay`] bundles the room registry, transport manager and
//! producer/consumer manager behind one resource-manager object with an
//! injected lifecycle: constructed at server start, shut down explicitly.
//! The signaling layer calls into it and translates its errors into
//! structured acknowledgements.
//!
//! ```text
//!   Connection ──► Relay ──┬── RoomRegistry      (who is live, who watches)
//!                          ├── TransportManager  (ICE/DTLS channels + owners)
//!                          ├── MediaManager      (producers, consumers, cascade)
//!                          └── WorkerPool        (round-robin media engines)
//! ```

pub mod error;
pub mod media;
pub mod rooms;
pub mod transports;

pub use error::RelayError;
pub use media::{ClosedProducer, MediaManager};
pub use rooms::{ProducerInfo, PushSender, RoomRegistry};
pub use transports::TransportManager;

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::engine::{
    DtlsParameters, EngineSettings, MediaKind, RtpCapabilities, RtpParameters, TransportDirection,
    WorkerPool,
};
use crate::signaling::message::{ConsumerData, PushEvent, TransportDescriptor};

/// Counters for logging and operational visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub rooms: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

/// The media relay: every server-side resource behind one handle
pub struct Relay {
    pool: Arc<WorkerPool>,
    rooms: RoomRegistry,
    transports: TransportManager,
    media: MediaManager,
}

impl Relay {
    /// Initialize the worker pool and empty registries
    pub fn new(pool_size: usize, settings: EngineSettings) -> Result<Self, RelayError> {
        let pool = Arc::new(WorkerPool::initialize(pool_size, settings)?);
        Ok(Self {
            transports: TransportManager::new(Arc::clone(&pool)),
            pool,
            rooms: RoomRegistry::new(),
            media: MediaManager::new(),
        })
    }

    /// Codec capabilities, answered by a round-robin selected router
    pub fn router_capabilities(&self) -> RtpCapabilities {
        self.pool.select().router().rtp_capabilities().clone()
    }

    /// Watch for fatal engine failure
    pub fn fatal_watch(&self) -> watch::Receiver<Option<String>> {
        self.pool.fatal_watch()
    }

    /// Join a connection to a room; returns the producers already live
    pub async fn join_room(
        &self,
        connection_id: u64,
        room_id: &str,
        push: PushSender,
    ) -> Vec<ProducerInfo> {
        self.rooms.join(room_id, connection_id, push).await
    }

    /// Create a transport for a connection in the given direction
    pub async fn create_transport(
        &self,
        connection_id: u64,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, RelayError> {
        self.transports.create(connection_id, direction).await
    }

    /// Complete a transport's DTLS handshake
    pub async fn connect_transport(
        &self,
        connection_id: u64,
        transport_id: Uuid,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), RelayError> {
        self.transports
            .connect(connection_id, transport_id, dtls_parameters)
            .await
    }

    /// Create a producer on a send transport and announce it to the room.
    ///
    /// The announcement goes out only after the producer is registered, so
    /// a `newProducer` push always describes a consumable producer.
    pub async fn produce(
        &self,
        connection_id: u64,
        room_id: &str,
        transport_id: Uuid,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Uuid, RelayError> {
        let transport = self
            .transports
            .get_for(connection_id, transport_id, TransportDirection::Send)
            .await?;

        let producer = self
            .media
            .create_producer(connection_id, room_id, transport.id(), kind, rtp_parameters)
            .await;

        let info = ProducerInfo {
            id: producer.id(),
            kind,
        };
        self.rooms.add_producer(room_id, info.clone()).await;
        self.rooms
            .broadcast_to_others(room_id, connection_id, PushEvent::NewProducer(info))
            .await;

        Ok(producer.id())
    }

    /// Consume one producer on a receive transport
    pub async fn consume(
        &self,
        connection_id: u64,
        transport_id: Uuid,
        producer_id: Uuid,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerData, RelayError> {
        let transport = self
            .transports
            .get_for(connection_id, transport_id, TransportDirection::Recv)
            .await?;
        let producer = self.media.get_producer(producer_id).await?;

        let consumer = self
            .media
            .create_consumer(connection_id, transport.id(), &producer, rtp_capabilities)
            .await?;

        Ok(ConsumerData {
            id: consumer.id(),
            producer_id,
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters().clone(),
        })
    }

    /// Bulk-consume every producer currently live in a room.
    ///
    /// Per-producer failures are logged and skipped; one bad producer
    /// never aborts the rest of the join. An unknown room is an error.
    pub async fn consume_room(
        &self,
        connection_id: u64,
        room_id: &str,
        transport_id: Uuid,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Vec<ConsumerData>, RelayError> {
        let producers = self.rooms.list_producers(room_id).await?;
        let mut consumed = Vec::with_capacity(producers.len());

        for info in producers {
            match self
                .consume(connection_id, transport_id, info.id, rtp_capabilities)
                .await
            {
                Ok(data) => consumed.push(data),
                Err(e) => {
                    tracing::warn!(
                        room = room_id,
                        producer = %info.id,
                        error = %e,
                        "Skipping producer in bulk consume"
                    );
                }
            }
        }

        Ok(consumed)
    }

    /// Close a producer, prune it from its room and notify the room
    pub async fn close_producer(&self, producer_id: Uuid) -> bool {
        let Some(closed) = self.media.close_producer(producer_id).await else {
            return false;
        };

        self.rooms.remove_producer(&closed.room_id, closed.id).await;
        self.rooms
            .broadcast_to_others(
                &closed.room_id,
                closed.connection_id,
                PushEvent::ProducerClosed {
                    producer_id: closed.id,
                },
            )
            .await;
        true
    }

    /// End a lecture: close every producer the connection has live in the
    /// room. Driven explicitly by the broadcaster, never inferred from a
    /// disconnect.
    pub async fn end_lecture(&self, connection_id: u64, room_id: &str) -> Result<usize, RelayError> {
        let producer_ids = self
            .media
            .producers_for_connection(connection_id, room_id)
            .await;

        let mut closed = 0;
        for id in producer_ids {
            if self.close_producer(id).await {
                closed += 1;
            }
        }

        tracing::info!(room = room_id, connection = connection_id, closed, "Lecture ended");
        Ok(closed)
    }

    /// Fan a chat line out to the other members of a room
    pub async fn chat(&self, connection_id: u64, room_id: &str, text: String) {
        self.rooms
            .broadcast_to_others(
                room_id,
                connection_id,
                PushEvent::Chat {
                    from: connection_id,
                    text,
                },
            )
            .await;
    }

    /// Cleanup for a disconnecting connection: close its producers (with
    /// room notifications), its consumers, and every transport it owns,
    /// then drop its room membership.
    pub async fn disconnect(&self, connection_id: u64, room_id: Option<&str>) {
        let closed = self.media.close_for_connection(connection_id).await;
        for info in closed {
            self.rooms.remove_producer(&info.room_id, info.id).await;
            self.rooms
                .broadcast_to_others(
                    &info.room_id,
                    connection_id,
                    PushEvent::ProducerClosed {
                        producer_id: info.id,
                    },
                )
                .await;
        }

        self.transports.close_for_connection(connection_id).await;

        if let Some(room) = room_id {
            self.rooms.leave(room, connection_id).await;
        }
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            rooms: self.rooms.room_count().await,
            transports: self.transports.count().await,
            producers: self.media.producer_count().await,
            consumers: self.media.consumer_count().await,
        }
    }

    /// Stop the worker pool without signalling a fatal failure
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn relay() -> Relay {
        Relay::new(2, EngineSettings::default()).unwrap()
    }

    fn parameters(kind: MediaKind) -> RtpParameters {
        let codec = RtpCapabilities::supported()
            .preferred_codec(kind)
            .unwrap()
            .clone();
        RtpParameters::for_codec(codec, 7)
    }

    async fn connected_send_transport(relay: &Relay, connection_id: u64) -> Uuid {
        let descriptor = relay
            .create_transport(connection_id, TransportDirection::Send)
            .await
            .unwrap();
        relay
            .connect_transport(
                connection_id,
                descriptor.id,
                DtlsParameters::generate(crate::engine::DtlsRole::Client),
            )
            .await
            .unwrap();
        descriptor.id
    }

    #[tokio::test]
    async fn test_produce_announces_after_registration() {
        let relay = relay();
        let (btx, _brx) = mpsc::unbounded_channel();
        let (vtx, mut vrx) = mpsc::unbounded_channel();
        relay.join_room(1, "abc123", btx).await;
        relay.join_room(2, "abc123", vtx).await;

        let transport = connected_send_transport(&relay, 1).await;
        let producer_id = relay
            .produce(1, "abc123", transport, MediaKind::Video, parameters(MediaKind::Video))
            .await
            .unwrap();

        // The push already describes a consumable producer
        match vrx.try_recv().unwrap() {
            PushEvent::NewProducer(info) => {
                assert_eq!(info.id, producer_id);
                let live = relay.rooms.list_producers("abc123").await.unwrap();
                assert!(live.iter().any(|p| p.id == info.id));
            }
            other => panic!("unexpected push: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_produce_requires_send_transport() {
        let relay = relay();
        let descriptor = relay
            .create_transport(1, TransportDirection::Recv)
            .await
            .unwrap();

        let result = relay
            .produce(1, "abc123", descriptor.id, MediaKind::Audio, parameters(MediaKind::Audio))
            .await;
        assert!(matches!(
            result,
            Err(RelayError::WrongTransportDirection { .. })
        ));
    }

    #[tokio::test]
    async fn test_bulk_consume_tolerates_partial_failure() {
        let relay = relay();
        let (btx, _brx) = mpsc::unbounded_channel();
        relay.join_room(1, "abc123", btx).await;

        let send = connected_send_transport(&relay, 1).await;
        let all = RtpCapabilities::supported();
        // Three producers: opus, vp8, h264
        for codec in all.codecs.clone() {
            let kind = codec.kind;
            relay
                .produce(1, "abc123", send, kind, RtpParameters::for_codec(codec, 9))
                .await
                .unwrap();
        }

        let (vtx, _vrx) = mpsc::unbounded_channel();
        relay.join_room(2, "abc123", vtx).await;
        let recv = relay
            .create_transport(2, TransportDirection::Recv)
            .await
            .unwrap();

        // A device that cannot handle H264: that consume fails, the rest
        // succeed
        let limited = RtpCapabilities {
            codecs: all
                .codecs
                .into_iter()
                .filter(|c| !c.mime_type.contains("H264"))
                .collect(),
        };

        let consumed = relay
            .consume_room(2, "abc123", recv.id, &limited)
            .await
            .unwrap();
        assert_eq!(consumed.len(), 2);
    }

    #[tokio::test]
    async fn test_consume_room_unknown_room_is_error() {
        let relay = relay();
        let recv = relay
            .create_transport(2, TransportDirection::Recv)
            .await
            .unwrap();

        let result = relay
            .consume_room(2, "nope", recv.id, &RtpCapabilities::supported())
            .await;
        assert!(matches!(result, Err(RelayError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_and_notifies() {
        let relay = relay();
        let (btx, _brx) = mpsc::unbounded_channel();
        let (vtx, mut vrx) = mpsc::unbounded_channel();
        relay.join_room(1, "abc123", btx).await;
        relay.join_room(2, "abc123", vtx).await;

        let send = connected_send_transport(&relay, 1).await;
        let producer_id = relay
            .produce(1, "abc123", send, MediaKind::Audio, parameters(MediaKind::Audio))
            .await
            .unwrap();
        let _ = vrx.try_recv(); // newProducer

        relay.disconnect(1, Some("abc123")).await;

        match vrx.try_recv().unwrap() {
            PushEvent::ProducerClosed { producer_id: id } => assert_eq!(id, producer_id),
            other => panic!("unexpected push: {:?}", other),
        }

        let stats = relay.stats().await;
        assert_eq!(stats.producers, 0);
        assert_eq!(stats.transports, 0);
        // Viewer still in the room; the room survives
        assert_eq!(stats.rooms, 1);
    }

    #[tokio::test]
    async fn test_end_lecture_closes_own_producers_only() {
        let relay = relay();
        let (t1, _r1) = mpsc::unbounded_channel();
        let (t2, _r2) = mpsc::unbounded_channel();
        relay.join_room(1, "abc123", t1).await;
        relay.join_room(2, "abc123", t2).await;

        let send1 = connected_send_transport(&relay, 1).await;
        let send2 = connected_send_transport(&relay, 2).await;
        relay
            .produce(1, "abc123", send1, MediaKind::Audio, parameters(MediaKind::Audio))
            .await
            .unwrap();
        relay
            .produce(2, "abc123", send2, MediaKind::Video, parameters(MediaKind::Video))
            .await
            .unwrap();

        let closed = relay.end_lecture(1, "abc123").await.unwrap();
        assert_eq!(closed, 1);
        assert_eq!(relay.stats().await.producers, 1);
    }
}
