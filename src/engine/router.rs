//! Per-worker routers
//!
//! A router is the codec-aware forwarding context of one worker. It holds
//! the negotiated codec capabilities (read-only after creation) and is the
//! factory for the worker's transports.

use uuid::Uuid;

use super::rtp::RtpCapabilities;
use super::transport::{BitrateHints, Transport, TransportDirection};
use super::worker::{EngineError, EngineHandle};

/// Codec-capability-aware forwarding context, 1:1 with a worker
pub struct Router {
    id: Uuid,
    rtp_capabilities: RtpCapabilities,
    bitrate: BitrateHints,
    engine: EngineHandle,
}

impl Router {
    pub(crate) fn new(
        id: Uuid,
        rtp_capabilities: RtpCapabilities,
        bitrate: BitrateHints,
        engine: EngineHandle,
    ) -> Self {
        Self {
            id,
            rtp_capabilities,
            bitrate,
            engine,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rtp_capabilities(&self) -> &RtpCapabilities {
        &self.rtp_capabilities
    }

    /// Ask the owning engine to allocate a transport bound to the
    /// configured addresses, with UDP preferred and TCP as fallback.
    pub async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<Transport, EngineError> {
        let allocation = self.engine.allocate_transport(direction).await?;
        Ok(Transport::new(
            allocation,
            direction,
            self.bitrate,
            self.engine.clone(),
        ))
    }
}
