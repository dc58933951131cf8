use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use envios_types::{ImageKind, ShipmentId};

use crate::{EvidenceError, EvidenceStore, StorageType, StoredEvidence};

/// Encodes images as `data:<mime>;base64,...` URLs. The reference carries
/// the whole image, so there is nothing to delete.
#[derive(Debug, Clone, Default)]
pub struct InlineEvidenceStore;

impl InlineEvidenceStore {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn data_url(kind: ImageKind, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", kind.mime(), STANDARD.encode(bytes))
}

#[async_trait]
impl EvidenceStore for InlineEvidenceStore {
    async fn put(
        &self,
        _shipment_id: ShipmentId,
        kind: ImageKind,
        bytes: &[u8],
    ) -> Result<StoredEvidence, EvidenceError> {
        Ok(StoredEvidence {
            url: data_url(kind, bytes),
            created: true,
        })
    }

    async fn delete(&self, reference: &str) -> Result<(), EvidenceError> {
        if !reference.starts_with("data:") {
            return Err(EvidenceError::ForeignReference(reference.to_string()));
        }
        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool, EvidenceError> {
        Ok(reference
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .is_some_and(|(_, payload)| STANDARD.decode(payload).is_ok()))
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Inline
    }
}
