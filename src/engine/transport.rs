//! WebRTC transport handles
//!
//! A transport is the secured network channel media flows over, negotiated
//! out of band from the signaling connection. The engine allocates the
//! listening side (ICE credentials, candidates, DTLS fingerprint); the
//! client completes the DTLS handshake through the signaling channel via
//! [`Transport::connect`].
//!
//! Invariant: a transport belongs to exactly one signaling connection and
//! carries media in exactly one direction.

use std::net::IpAddr;

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker::{EngineCommand, EngineHandle};

/// Direction of a transport relative to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Client → server (producing)
    Send,
    /// Server → client (consuming)
    Recv,
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportDirection::Send => f.write_str("send"),
            TransportDirection::Recv => f.write_str("recv"),
        }
    }
}

/// DTLS handshake state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// ICE credentials for one transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

impl IceParameters {
    /// Generate fresh credentials (8-char ufrag, 24-char password)
    pub fn generate() -> Self {
        Self {
            username_fragment: random_token(8),
            password: random_token(24),
            ice_lite: true,
        }
    }
}

/// Host candidate priority for UDP; UDP is always preferred
pub const UDP_CANDIDATE_PRIORITY: u32 = 2_130_706_431;
/// Host candidate priority for the TCP fallback
pub const TCP_CANDIDATE_PRIORITY: u32 = 1_694_498_815;

/// A single ICE host candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
    /// `udp` or `tcp`
    pub protocol: String,
    pub candidate_type: String,
}

impl IceCandidate {
    /// The candidate pair for one allocated port: UDP preferred, TCP fallback
    pub fn host_pair(address: IpAddr, port: u16) -> Vec<IceCandidate> {
        vec![
            IceCandidate {
                foundation: "udpcandidate".into(),
                priority: UDP_CANDIDATE_PRIORITY,
                address,
                port,
                protocol: "udp".into(),
                candidate_type: "host".into(),
            },
            IceCandidate {
                foundation: "tcpcandidate".into(),
                priority: TCP_CANDIDATE_PRIORITY,
                address,
                port,
                protocol: "tcp".into(),
                candidate_type: "host".into(),
            },
        ]
    }
}

/// DTLS role of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    Auto,
    Client,
    Server,
}

/// Certificate fingerprint exchanged during DTLS negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// DTLS negotiation parameters for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

impl DtlsParameters {
    /// Generate parameters with a fresh SHA-256 certificate fingerprint
    pub fn generate(role: DtlsRole) -> Self {
        let mut rng = rand::thread_rng();
        let digest: Vec<String> = (0..32).map(|_| format!("{:02X}", rng.gen::<u8>())).collect();

        Self {
            role,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".into(),
                value: digest.join(":"),
            }],
        }
    }
}

/// Bitrate floor/ceiling hints applied at transport creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateHints {
    pub min_bitrate: u32,
    pub max_bitrate: u32,
}

impl Default for BitrateHints {
    fn default() -> Self {
        Self {
            min_bitrate: 100_000,
            max_bitrate: 3_500_000,
        }
    }
}

/// Allocation returned by an engine for a new transport
#[derive(Debug, Clone)]
pub struct TransportAllocation {
    pub id: Uuid,
    pub port: u16,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// Server-side transport handle
///
/// Created through a router; destroyed on explicit close, DTLS failure or
/// teardown of the owning signaling connection.
pub struct Transport {
    id: Uuid,
    direction: TransportDirection,
    ice_parameters: IceParameters,
    ice_candidates: Vec<IceCandidate>,
    dtls_parameters: DtlsParameters,
    hints: BitrateHints,
    state: Mutex<DtlsState>,
    remote_dtls: Mutex<Option<DtlsParameters>>,
    engine: EngineHandle,
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Transport {
    pub(crate) fn new(
        allocation: TransportAllocation,
        direction: TransportDirection,
        hints: BitrateHints,
        engine: EngineHandle,
    ) -> Self {
        Self {
            id: allocation.id,
            direction,
            ice_parameters: allocation.ice_parameters,
            ice_candidates: allocation.ice_candidates,
            dtls_parameters: allocation.dtls_parameters,
            hints,
            state: Mutex::new(DtlsState::New),
            remote_dtls: Mutex::new(None),
            engine,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    pub fn ice_parameters(&self) -> &IceParameters {
        &self.ice_parameters
    }

    pub fn ice_candidates(&self) -> &[IceCandidate] {
        &self.ice_candidates
    }

    pub fn dtls_parameters(&self) -> &DtlsParameters {
        &self.dtls_parameters
    }

    pub fn bitrate_hints(&self) -> BitrateHints {
        self.hints
    }

    pub fn dtls_state(&self) -> DtlsState {
        *self.state.lock()
    }

    /// Complete the DTLS handshake with the remote endpoint's parameters.
    ///
    /// Valid only once, from the `New` state. A transport that failed or
    /// closed cannot be reconnected; the client recreates it instead.
    pub fn connect(&self, remote: DtlsParameters) -> Result<(), DtlsState> {
        let mut state = self.state.lock();
        match *state {
            DtlsState::New => {
                *state = DtlsState::Connecting;
                if remote.fingerprints.is_empty() {
                    *state = DtlsState::Failed;
                    return Err(DtlsState::Failed);
                }
                *self.remote_dtls.lock() = Some(remote);
                *state = DtlsState::Connected;
                Ok(())
            }
            other => Err(other),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), DtlsState::Closed | DtlsState::Failed)
    }

    /// Close the transport and release its engine-side port
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state == DtlsState::Closed {
            return;
        }
        *state = DtlsState::Closed;
        drop(state);

        self.engine.send(EngineCommand::ReleaseTransport { id: self.id });
        tracing::debug!(transport = %self.id, direction = %self.direction, "Transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.dtls_state())
            .finish()
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_parameters_lengths() {
        let ice = IceParameters::generate();

        assert_eq!(ice.username_fragment.len(), 8);
        assert_eq!(ice.password.len(), 24);
        assert!(ice.ice_lite);
    }

    #[test]
    fn test_host_pair_prefers_udp() {
        let candidates = IceCandidate::host_pair("192.0.2.1".parse().unwrap(), 40000);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].protocol, "udp");
        assert!(candidates[0].priority > candidates[1].priority);
    }

    #[test]
    fn test_fingerprint_shape() {
        let dtls = DtlsParameters::generate(DtlsRole::Auto);
        let fp = &dtls.fingerprints[0];

        assert_eq!(fp.algorithm, "sha-256");
        // 32 bytes, colon separated: 32 * 2 hex chars + 31 colons
        assert_eq!(fp.value.len(), 95);
    }
}
