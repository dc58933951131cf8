use std::collections::BTreeMap;

use async_trait::async_trait;
use envios_types::{Page, Shipment, ShipmentFilter, ShipmentId};
use tokio::sync::RwLock;

use crate::{ShipmentStore, StoreError};

/// Process-local store. Every operation takes the map lock, which makes
/// the version check and the write of `replace` a single step.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ShipmentId, Shipment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.values().any(|s| s.ticket == shipment.ticket) {
            return Err(StoreError::DuplicateTicket(shipment.ticket.clone()));
        }
        records.insert(shipment.id, shipment.clone());
        Ok(())
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<Shipment>, StoreError> {
        let records = self.records.read().await;
        Ok(records.values().find(|s| s.ticket == ticket).cloned())
    }

    async fn replace(&self, expected_version: u64, shipment: &Shipment) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&shipment.id)
            .ok_or(StoreError::Missing(shipment.id))?;
        if current.version() != expected_version {
            return Err(StoreError::VersionMismatch {
                id: shipment.id,
                expected: expected_version,
                found: current.version(),
            });
        }
        *current = shipment.clone();
        Ok(())
    }

    async fn query(&self, filter: &ShipmentFilter, page: Page) -> Result<Vec<Shipment>, StoreError> {
        let records = self.records.read().await;
        let matching = records.values().filter(|s| filter.matches(s)).cloned().collect();
        Ok(page.apply(matching))
    }

    async fn count(&self, filter: &ShipmentFilter) -> Result<usize, StoreError> {
        let records = self.records.read().await;
        Ok(records.values().filter(|s| filter.matches(s)).count())
    }

    async fn delete(&self, id: ShipmentId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
