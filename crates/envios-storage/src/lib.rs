//! Evidence image storage for envios.
//!
//! An [`EvidenceStore`] accepts the bytes of a delivery photo and returns a
//! durable reference URL that is recorded in the shipment history.
//!
//! - [`FileEvidenceStore`]: content-addressed files under the data directory
//! - [`InlineEvidenceStore`]: `data:` URLs, nothing written anywhere

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use envios_types::{ImageKind, ShipmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;
mod inline;

pub use file::FileEvidenceStore;
pub use inline::InlineEvidenceStore;

/// Represents the type of evidence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    File,
    Inline,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::File => write!(f, "file"),
            StorageType::Inline => write!(f, "inline"),
        }
    }
}

impl FromStr for StorageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "local" => Ok(StorageType::File),
            "inline" | "data" => Ok(StorageType::Inline),
            _ => anyhow::bail!("unknown storage type: {}", s),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("reference does not belong to this store: {0}")]
    ForeignReference(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Outcome of [`EvidenceStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvidence {
    pub url: String,
    /// False when the same image was already stored under this reference,
    /// so other records may point at it.
    pub created: bool,
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist an image and return its reference URL.
    async fn put(
        &self,
        shipment_id: ShipmentId,
        kind: ImageKind,
        bytes: &[u8],
    ) -> Result<StoredEvidence, EvidenceError>;

    /// Remove a stored image. Removing an absent image is not an error.
    async fn delete(&self, reference: &str) -> Result<(), EvidenceError>;

    async fn exists(&self, reference: &str) -> Result<bool, EvidenceError>;

    fn storage_type(&self) -> StorageType;
}
