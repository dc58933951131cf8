//! Core lifecycle engine for envios.
//!
//! [`LifecycleManager`] is the only component that mutates shipment state.
//! It plans each operation with `envios-lifecycle`, then drives the staged
//! plan against the configured collaborators:
//!
//! - a [`ShipmentStore`] for records (conditional writes on `version`)
//! - an [`EvidenceStore`] for delivery evidence images
//! - a [`Notifier`] and [`MessageLog`] for customer notifications
//!
//! Every store and evidence call is bounded by a timeout. Notifications run
//! on spawned tasks after the write and never fail the operation.

mod manager;

pub use envios_lifecycle::{LifecycleError, LifecyclePolicy, MessageTemplates, PolicyRow};
pub use manager::{Catalog, LifecycleManager, Timeouts};

pub use envios_notify::{MessageLog, Notifier};
pub use envios_storage::EvidenceStore;
pub use envios_store::ShipmentStore;
