//! Viewer session controller
//!
//! Joins a room and consumes whatever is (or becomes) live. The receive
//! transport is created lazily on the first producer, bulk-consume covers
//! producers that were live before the join, and push events cover the
//! rest. Disconnections run a bounded reconnect loop; exhaustion lands in
//! a terminal failure that only a manual retry leaves.
//!
//! All transition logic lives in [`ViewerStateMachine`]; this controller
//! is the I/O around it.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::engine::{MediaKind, TransportDirection};
use crate::error::{Error, Result};
use crate::relay::ProducerInfo;
use crate::session::client::{SessionEvent, SignalingClient};
use crate::session::config::SessionConfig;
use crate::session::device::Device;
use crate::session::state::{ViewerPhase, ViewerStateMachine};
use crate::signaling::message::{PushEvent, TransportDescriptor};

/// One consumed track held by the viewer
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub consumer_id: Uuid,
    pub producer_id: Uuid,
    pub kind: MediaKind,
}

/// Viewer session
pub struct Viewer {
    config: SessionConfig,
    room_id: String,
    state: ViewerStateMachine,
    client: Option<SignalingClient>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    device: Option<Device>,
    recv_transport: Option<TransportDescriptor>,
    tracks: Vec<RemoteTrack>,
}

impl Viewer {
    pub fn new(config: SessionConfig, room_id: impl Into<String>) -> Self {
        let max_attempts = config.max_reconnect_attempts;
        Self {
            config,
            room_id: room_id.into(),
            state: ViewerStateMachine::new(max_attempts),
            client: None,
            events: None,
            device: None,
            recv_transport: None,
            tracks: Vec::new(),
        }
    }

    pub fn phase(&self) -> ViewerPhase {
        self.state.phase()
    }

    /// The tracks currently rendered
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    pub fn recv_transport_id(&self) -> Option<Uuid> {
        self.recv_transport.as_ref().map(|t| t.id)
    }

    /// Connect and join the room. With producers already live the viewer
    /// bulk-consumes them and is connected; an empty room leaves it
    /// waiting for the first `newProducer` push.
    pub async fn connect(&mut self) -> Result<()> {
        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release();
                self.state.fail();
                Err(e)
            }
        }
    }

    async fn try_connect(&mut self) -> Result<()> {
        let (client, events) = SignalingClient::connect(&self.config.server_url).await?;
        let capabilities = client.get_router_capabilities().await?;
        let device = Device::load(capabilities);

        let producers = client.join_room(&self.room_id).await?;

        self.client = Some(client);
        self.events = Some(events);
        self.device = Some(device);

        if producers.is_empty() {
            self.state.on_connected(false);
            tracing::info!(room = %self.room_id, "Joined empty room, waiting for producers");
            return Ok(());
        }

        self.ensure_recv_transport().await?;
        self.consume_all().await?;
        self.state.on_connected(true);
        tracing::info!(
            room = %self.room_id,
            tracks = self.tracks.len(),
            "Joined room and consuming"
        );
        Ok(())
    }

    /// Process the next event from the signaling channel.
    ///
    /// Returns `false` once the session is over: terminal failure after
    /// exhausted reconnects, or a deliberate close.
    pub async fn process_one(&mut self) -> Result<bool> {
        let event = match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => return Ok(false),
        };

        match event {
            Some(SessionEvent::Push(PushEvent::NewProducer(info))) => {
                self.on_new_producer(info).await;
                Ok(true)
            }
            Some(SessionEvent::Push(PushEvent::ProducerClosed { producer_id })) => {
                self.tracks.retain(|t| t.producer_id != producer_id);
                tracing::info!(
                    producer = %producer_id,
                    remaining = self.tracks.len(),
                    "Producer closed, track pruned"
                );
                if self.tracks.is_empty() {
                    // Back to waiting; the lecture may resume
                    self.state.on_connected(false);
                }
                Ok(true)
            }
            Some(SessionEvent::Push(PushEvent::Chat { .. })) => Ok(true),
            Some(SessionEvent::Disconnected) | None => self.reconnect().await,
        }
    }

    /// Drive the session until it ends
    pub async fn run(&mut self) -> Result<()> {
        while self.process_one().await? {}
        Ok(())
    }

    /// Manual retry from the terminal failure state
    pub async fn retry(&mut self) -> Result<()> {
        if !self.state.manual_retry() {
            return Err(Error::Rejected("session is not in the failed state".into()));
        }
        self.release();
        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release();
                self.state.fail();
                Err(e)
            }
        }
    }

    async fn on_new_producer(&mut self, info: ProducerInfo) {
        // Per-producer failures leave the session alive; the next push or
        // a reconnect can still succeed.
        if let Err(e) = self.consume_new(info.id).await {
            tracing::warn!(producer = %info.id, error = %e, "Failed to consume new producer");
            return;
        }
        self.state.on_connected(true);
    }

    async fn consume_new(&mut self, producer_id: Uuid) -> Result<()> {
        self.ensure_recv_transport().await?;

        let client = self.client.as_ref().ok_or(Error::ConnectionClosed)?;
        let device = self.device.as_ref().ok_or(Error::ConnectionClosed)?;
        let transport = self.recv_transport.as_ref().ok_or(Error::ConnectionClosed)?;

        let data = client
            .consume(transport.id, producer_id, device.rtp_capabilities().clone())
            .await?;
        self.tracks.push(RemoteTrack {
            consumer_id: data.id,
            producer_id: data.producer_id,
            kind: data.kind,
        });
        Ok(())
    }

    async fn consume_all(&mut self) -> Result<()> {
        let client = self.client.as_ref().ok_or(Error::ConnectionClosed)?;
        let device = self.device.as_ref().ok_or(Error::ConnectionClosed)?;
        let transport = self.recv_transport.as_ref().ok_or(Error::ConnectionClosed)?;

        let consumed = client
            .consume_room(transport.id, device.rtp_capabilities().clone())
            .await?;
        for data in consumed {
            self.tracks.push(RemoteTrack {
                consumer_id: data.id,
                producer_id: data.producer_id,
                kind: data.kind,
            });
        }
        Ok(())
    }

    /// Create and connect the receive transport on first use only
    async fn ensure_recv_transport(&mut self) -> Result<()> {
        if self.recv_transport.is_some() {
            return Ok(());
        }
        let client = self.client.as_ref().ok_or(Error::ConnectionClosed)?;
        let device = self.device.as_ref().ok_or(Error::ConnectionClosed)?;

        let transport = client.create_transport(TransportDirection::Recv).await?;
        client
            .connect_transport(transport.id, device.dtls_parameters().clone())
            .await?;
        self.recv_transport = Some(transport);
        Ok(())
    }

    /// Bounded reconnect loop. Every attempt starts from released local
    /// state; returns `false` once the cap is hit and the phase is
    /// terminal.
    async fn reconnect(&mut self) -> Result<bool> {
        self.state.on_disconnect();
        tracing::info!(room = %self.room_id, "Disconnected, reconnecting");

        loop {
            let Some(attempt) = self.state.begin_attempt() else {
                self.release();
                tracing::warn!(room = %self.room_id, "Reconnect attempts exhausted");
                return Ok(false);
            };

            self.release();
            tokio::time::sleep(self.config.reconnect_backoff * attempt).await;

            match self.try_connect().await {
                Ok(()) => {
                    tracing::info!(room = %self.room_id, attempt, "Reconnected");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(room = %self.room_id, attempt, error = %e, "Reconnect failed");
                }
            }
        }
    }

    /// Release every locally held resource before a fresh connection
    fn release(&mut self) {
        if let Some(client) = self.client.take() {
            client.close();
        }
        self.events = None;
        self.device = None;
        self.recv_transport = None;
        self.tracks.clear();
    }
}
