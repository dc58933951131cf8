//! Shipment store abstraction for envios.
//!
//! [`ShipmentStore`] is the seam between the lifecycle manager and
//! persistence. Writes of existing records are conditional on the version
//! the caller read, so racing writers cannot overwrite each other.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`]: process-local, used by tests and `store.kind = "memory"`
//! - [`FileStore`]: one JSON document per shipment with atomic writes and a
//!   lock file serialising writers across processes
//!
//! # Example
//!
//! ```
//! use envios_store::{FileStore, ShipmentStore};
//! use std::path::PathBuf;
//!
//! let store = FileStore::new(PathBuf::from(".envios"));
//! assert!(store.location().ends_with("shipments"));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use envios_types::{Page, Shipment, ShipmentFilter, ShipmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;
pub mod lock;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket already exists: {0}")]
    DuplicateTicket(String),

    #[error("shipment {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionMismatch {
        id: ShipmentId,
        expected: u64,
        found: u64,
    },

    #[error("shipment not found: {0}")]
    Missing(ShipmentId),

    #[error("store lock not acquired within {0:?}, write abandoned")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for shipment records.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::DuplicateTicket`] if
    /// another record already uses the ticket.
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError>;

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, StoreError>;

    /// Exact ticket lookup.
    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<Shipment>, StoreError>;

    /// Overwrite a record if its stored version is still `expected_version`.
    async fn replace(&self, expected_version: u64, shipment: &Shipment) -> Result<(), StoreError>;

    /// Matching records, newest first, windowed by `page`.
    async fn query(&self, filter: &ShipmentFilter, page: Page) -> Result<Vec<Shipment>, StoreError>;

    async fn count(&self, filter: &ShipmentFilter) -> Result<usize, StoreError>;

    /// Remove a record; returns whether it existed.
    async fn delete(&self, id: ShipmentId) -> Result<bool, StoreError>;

    /// Human-readable description of where records live.
    fn location(&self) -> String;
}

/// Selects a store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    File,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::File => write!(f, "file"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreKind::Memory),
            "file" | "fs" | "filesystem" => Ok(StoreKind::File),
            _ => Err(anyhow::anyhow!("unknown store kind: {}", s)),
        }
    }
}
