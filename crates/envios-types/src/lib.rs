//! Core domain types for envios.
//!
//! Shipments, their delivery states and history, the actors that change
//! them, and the filters used to list them. Nothing in this crate performs
//! I/O; lifecycle rules live in `envios-lifecycle`.

mod actor;
mod department;
mod filter;
mod notification;
mod payload;
mod shipment;
mod state;
mod tracking;

pub use actor::{Actor, Role};
pub use department::{DEFAULT_REASONS, Department};
pub use filter::{DEFAULT_PAGE_LIMIT, Page, ShipmentFilter};
pub use notification::{MessageRecord, NotificationIntent};
pub use payload::{Evidence, FieldError, ImageKind, TransitionPayload};
pub use shipment::{
    Address, Contact, EntryDetail, NewShipment, Shipment, ShipmentId, StatusHistoryEntry,
    ValidatedShipment,
};
pub use state::{DeliveryState, LifecycleEvent};
pub use tracking::{TrackingStep, TrackingView};

/// The default reason catalog as owned strings.
pub fn default_reasons() -> Vec<String> {
    DEFAULT_REASONS.iter().map(|r| r.to_string()).collect()
}
