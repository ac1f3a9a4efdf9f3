//! Transport manager
//!
//! Tracks every live transport together with the signaling connection that
//! owns it. The owning-connection key is populated at creation time, so
//! disconnect cleanup is a plain index lookup instead of a guess.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::{Transport, TransportDirection, WorkerPool};
use crate::signaling::message::TransportDescriptor;

use super::error::RelayError;

struct TransportRecord {
    transport: Arc<Transport>,
    connection_id: u64,
}

/// Registry of live transports, keyed by transport id
pub struct TransportManager {
    pool: Arc<WorkerPool>,
    transports: RwLock<HashMap<Uuid, TransportRecord>>,
}

impl TransportManager {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            transports: RwLock::new(HashMap::new()),
        }
    }

    /// Create a transport for `connection_id` through a round-robin
    /// selected worker and return the parameters the client mirrors.
    pub async fn create(
        &self,
        connection_id: u64,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, RelayError> {
        let worker = self.pool.select();
        let transport = worker.router().create_transport(direction).await?;

        let descriptor = TransportDescriptor {
            id: transport.id(),
            direction,
            ice_parameters: transport.ice_parameters().clone(),
            ice_candidates: transport.ice_candidates().to_vec(),
            dtls_parameters: transport.dtls_parameters().clone(),
        };

        tracing::info!(
            transport = %transport.id(),
            connection = connection_id,
            worker = worker.id(),
            %direction,
            "Transport created"
        );

        self.transports.write().await.insert(
            transport.id(),
            TransportRecord {
                transport: Arc::new(transport),
                connection_id,
            },
        );

        Ok(descriptor)
    }

    /// Complete the DTLS handshake on a transport owned by `connection_id`
    pub async fn connect(
        &self,
        connection_id: u64,
        transport_id: Uuid,
        dtls_parameters: crate::engine::DtlsParameters,
    ) -> Result<(), RelayError> {
        let transport = self.get_owned(connection_id, transport_id).await?;

        match transport.connect(dtls_parameters) {
            Ok(()) => Ok(()),
            Err(state) => {
                tracing::warn!(transport = %transport_id, ?state, "DTLS connect refused");
                // A failed handshake self-closes; the client recreates the
                // transport rather than retrying the handshake.
                if transport.is_closed() {
                    self.transports.write().await.remove(&transport_id);
                }
                Err(RelayError::InvalidDtlsState)
            }
        }
    }

    /// Look up a transport, verifying ownership and direction.
    ///
    /// A transport belonging to another connection is reported as not
    /// found; stale ids are a client error, never a server fault.
    pub async fn get_for(
        &self,
        connection_id: u64,
        transport_id: Uuid,
        direction: TransportDirection,
    ) -> Result<Arc<Transport>, RelayError> {
        let transport = self.get_owned(connection_id, transport_id).await?;
        if transport.direction() != direction {
            return Err(RelayError::WrongTransportDirection {
                expected: direction,
                actual: transport.direction(),
            });
        }
        Ok(transport)
    }

    async fn get_owned(
        &self,
        connection_id: u64,
        transport_id: Uuid,
    ) -> Result<Arc<Transport>, RelayError> {
        let transports = self.transports.read().await;
        match transports.get(&transport_id) {
            Some(record) if record.connection_id == connection_id => {
                Ok(Arc::clone(&record.transport))
            }
            _ => Err(RelayError::TransportNotFound(transport_id)),
        }
    }

    /// Close and remove one transport
    pub async fn close(&self, transport_id: Uuid) {
        if let Some(record) = self.transports.write().await.remove(&transport_id) {
            record.transport.close();
        }
    }

    /// Close every transport owned by a connection; returns the ids closed
    pub async fn close_for_connection(&self, connection_id: u64) -> Vec<Uuid> {
        let mut transports = self.transports.write().await;
        let ids: Vec<Uuid> = transports
            .iter()
            .filter(|(_, record)| record.connection_id == connection_id)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(record) = transports.remove(id) {
                record.transport.close();
            }
        }

        if !ids.is_empty() {
            tracing::info!(
                connection = connection_id,
                closed = ids.len(),
                "Transports closed on disconnect"
            );
        }
        ids
    }

    pub async fn count(&self) -> usize {
        self.transports.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DtlsParameters, DtlsRole, EngineSettings};

    fn pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::initialize(2, EngineSettings::default()).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_connect() {
        let manager = TransportManager::new(pool());

        let descriptor = manager.create(1, TransportDirection::Send).await.unwrap();
        assert_eq!(descriptor.direction, TransportDirection::Send);
        assert_eq!(descriptor.ice_candidates.len(), 2);

        manager
            .connect(1, descriptor.id, DtlsParameters::generate(DtlsRole::Client))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_transport_is_client_error() {
        let manager = TransportManager::new(pool());
        let bogus = Uuid::new_v4();

        let result = manager
            .connect(1, bogus, DtlsParameters::generate(DtlsRole::Client))
            .await;
        assert_eq!(result, Err(RelayError::TransportNotFound(bogus)));
    }

    #[tokio::test]
    async fn test_ownership_is_enforced() {
        let manager = TransportManager::new(pool());
        let descriptor = manager.create(1, TransportDirection::Send).await.unwrap();

        let result = manager
            .get_for(2, descriptor.id, TransportDirection::Send)
            .await;
        assert_eq!(result, Err(RelayError::TransportNotFound(descriptor.id)));
    }

    #[tokio::test]
    async fn test_direction_is_enforced() {
        let manager = TransportManager::new(pool());
        let descriptor = manager.create(1, TransportDirection::Recv).await.unwrap();

        let result = manager
            .get_for(1, descriptor.id, TransportDirection::Send)
            .await;
        assert!(matches!(
            result,
            Err(RelayError::WrongTransportDirection { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_closes_owned_transports() {
        let manager = TransportManager::new(pool());
        let a = manager.create(1, TransportDirection::Send).await.unwrap();
        let _b = manager.create(1, TransportDirection::Recv).await.unwrap();
        let keep = manager.create(2, TransportDirection::Recv).await.unwrap();

        let closed = manager.close_for_connection(1).await;
        assert_eq!(closed.len(), 2);
        assert!(closed.contains(&a.id));
        assert_eq!(manager.count().await, 1);

        // The survivor still resolves
        assert!(manager
            .get_for(2, keep.id, TransportDirection::Recv)
            .await
            .is_ok());
    }
}
