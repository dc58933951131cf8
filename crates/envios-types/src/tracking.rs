use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Department, DeliveryState, EntryDetail, Shipment};

/// Public tracking view of a shipment.
///
/// Carries no internal identifiers, no phone, no national id, no evidence
/// references and no staff names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingView {
    pub ticket: String,
    pub state: DeliveryState,
    pub street: String,
    pub number: String,
    pub department: Department,
    pub contact_name: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<TrackingStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStep {
    pub state: DeliveryState,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
}

impl From<&Shipment> for TrackingView {
    fn from(shipment: &Shipment) -> Self {
        let history = shipment
            .history()
            .iter()
            .map(|entry| TrackingStep {
                state: entry.state,
                timestamp: entry.timestamp,
                receiver_name: match &entry.detail {
                    EntryDetail::Delivered { receiver_name, .. } => Some(receiver_name.clone()),
                    _ => None,
                },
            })
            .collect();

        Self {
            ticket: shipment.ticket.clone(),
            state: shipment.state(),
            street: shipment.address.street.clone(),
            number: shipment.address.number.clone(),
            department: shipment.address.department,
            contact_name: shipment.contact.name.clone(),
            created_at: shipment.created_at,
            history,
        }
    }
}
