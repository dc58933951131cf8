//! # Envios
//!
//! Shipment lifecycle service for a courier operation in Uruguay.
//!
//! Shipments are registered by office staff, assigned to couriers and end
//! as delivered or not delivered, with a retry path back to a courier. Every
//! change is appended to the shipment's history and announced to the
//! customer through a notification.
//!
//! ## Pipeline
//!
//! 1. [`lifecycle::plan_transition`] checks the transition table, the role
//!    policy, the retry limit and the payload.
//! 2. [`engine::LifecycleManager`] stores evidence, writes the record with a
//!    version check and dispatches the notification.
//! 3. [`server::router`] exposes the operations over HTTP.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use envios::types::{Actor, NewShipment, Role};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manager = envios::open(Path::new(".envios"))?;
//! let agent = Actor::new("u-1", "Mostrador", Role::Agent);
//! let input = NewShipment {
//!     ticket: "ENV-001".into(),
//!     street: "Sarandí".into(),
//!     number: "500".into(),
//!     department: "Montevideo".into(),
//!     reason: "Entrega".into(),
//!     phone: "099123456".into(),
//!     contact_name: "María Pérez".into(),
//!     ..Default::default()
//! };
//! let shipment = manager.create_shipment(&input, &agent).await?;
//! println!("{} is {}", shipment.ticket, shipment.state());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use anyhow::Result;

pub use envios_config as config;
pub use envios_core as engine;
pub use envios_lifecycle as lifecycle;
pub use envios_notify as notify;
pub use envios_server as server;
pub use envios_storage as storage;
pub use envios_store as store;
pub use envios_types as types;

pub use envios_core::{LifecycleError, LifecycleManager};

/// Build a manager from the configuration stored in `data_dir`.
pub fn open(data_dir: &Path) -> Result<LifecycleManager> {
    let config = envios_config::load_config(data_dir)?;
    let manager = LifecycleManager::from_config(&config, data_dir)?;
    tracing::debug!(data_dir = %data_dir.display(), ?manager, "opened envios data directory");
    Ok(manager)
}
