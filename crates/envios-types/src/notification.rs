use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DeliveryState, ShipmentId};

/// A message to be delivered to a shipment's contact after a committed
/// change. Built by the lifecycle, delivered best-effort by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub shipment_id: ShipmentId,
    pub ticket: String,
    pub phone: String,
    pub state: DeliveryState,
    pub message: String,
}

/// One line of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub ticket: String,
    pub phone: String,
    pub state: DeliveryState,
    pub message: String,
    /// Whether the notifier reported a successful delivery
    pub sent: bool,
}

impl MessageRecord {
    pub fn from_intent(intent: &NotificationIntent, sent: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            ticket: intent.ticket.clone(),
            phone: intent.phone.clone(),
            state: intent.state,
            message: intent.message.clone(),
            sent,
        }
    }
}
