//! Broadcaster session controller
//!
//! Drives a lecturer's side of a broadcast: obtain the room token from
//! the scheduling collaborator, negotiate a device, create and connect a
//! send transport, capture local tracks and produce them. Ending the
//! lecture closes the local resources, tells the server, and notifies the
//! collaborator.

use std::sync::Arc;

use uuid::Uuid;

use crate::engine::{MediaKind, TransportDirection};
use crate::error::{Error, Result};
use crate::session::client::SignalingClient;
use crate::session::config::SessionConfig;
use crate::session::device::Device;
use crate::session::lifecycle::LectureLifecycle;
use crate::session::source::MediaSource;
use crate::signaling::message::TransportDescriptor;

/// One locally produced track
#[derive(Debug, Clone)]
pub struct LocalProducer {
    pub id: Uuid,
    pub kind: MediaKind,
    pub label: String,
    pub muted: bool,
}

/// Broadcaster session
pub struct Broadcaster {
    config: SessionConfig,
    source: Arc<dyn MediaSource>,
    lifecycle: Arc<dyn LectureLifecycle>,
    client: Option<SignalingClient>,
    device: Option<Device>,
    send_transport: Option<TransportDescriptor>,
    producers: Vec<LocalProducer>,
    lecture_id: Option<String>,
    room_id: Option<String>,
}

impl Broadcaster {
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn MediaSource>,
        lifecycle: Arc<dyn LectureLifecycle>,
    ) -> Self {
        Self {
            config,
            source,
            lifecycle,
            client: None,
            device: None,
            send_transport: None,
            producers: Vec::new(),
            lecture_id: None,
            room_id: None,
        }
    }

    /// Start broadcasting a lecture: full negotiation plus one producer
    /// per captured track. Returns the room token viewers join with.
    pub async fn go_live(&mut self, lecture_id: &str) -> Result<String> {
        if self.is_live() {
            return Err(Error::Rejected("already broadcasting".into()));
        }

        let room_id = self.lifecycle.lecture_started(lecture_id).await?;

        let (client, _events) = SignalingClient::connect(&self.config.server_url).await?;
        let capabilities = client.get_router_capabilities().await?;
        let device = Device::load(capabilities);

        client.join_room(&room_id).await?;

        let transport = client.create_transport(TransportDirection::Send).await?;
        client
            .connect_transport(transport.id, device.dtls_parameters().clone())
            .await?;

        let tracks = self.source.capture()?;
        let mut producers = Vec::with_capacity(tracks.len());
        for track in tracks {
            let Some(parameters) = device.producer_parameters(track.kind) else {
                tracing::warn!(kind = %track.kind, label = %track.label, "Track kind not producible");
                continue;
            };
            let id = client
                .produce(transport.id, track.kind, parameters, &room_id)
                .await?;
            producers.push(LocalProducer {
                id,
                kind: track.kind,
                label: track.label,
                muted: false,
            });
        }

        tracing::info!(
            lecture = lecture_id,
            room = %room_id,
            producers = producers.len(),
            "Broadcast live"
        );

        self.client = Some(client);
        self.device = Some(device);
        self.send_transport = Some(transport);
        self.producers = producers;
        self.lecture_id = Some(lecture_id.to_string());
        self.room_id = Some(room_id.clone());

        Ok(room_id)
    }

    pub fn is_live(&self) -> bool {
        self.client.is_some()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn producers(&self) -> &[LocalProducer] {
        &self.producers
    }

    /// Mute or unmute the local producers of one kind.
    ///
    /// Returns whether any producer changed state.
    pub fn set_muted(&mut self, kind: MediaKind, muted: bool) -> bool {
        let mut changed = false;
        for producer in self.producers.iter_mut().filter(|p| p.kind == kind) {
            if producer.muted != muted {
                producer.muted = muted;
                changed = true;
            }
        }
        if changed {
            tracing::info!(%kind, muted, "Local producers toggled");
        }
        changed
    }

    /// End the lecture: release local resources, tell the server, then
    /// notify the scheduling collaborator. Returns how many producers the
    /// server closed.
    pub async fn end_lecture(&mut self) -> Result<usize> {
        let client = self.client.take().ok_or(Error::ConnectionClosed)?;
        let lecture_id = self.lecture_id.take().unwrap_or_default();

        self.producers.clear();
        self.send_transport = None;
        self.device = None;
        self.room_id = None;

        let closed = client.end_lecture().await?;
        client.close();

        self.lifecycle.lecture_ended(&lecture_id).await?;

        tracing::info!(lecture = %lecture_id, closed, "Lecture ended");
        Ok(closed)
    }
}
