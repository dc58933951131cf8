use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Actor, Department, DeliveryState, FieldError};

/// Opaque unique shipment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(Uuid);

impl ShipmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ShipmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ShipmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Where the shipment has to go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_street: Option<String>,
    pub department: Department,
}

/// Who to call about the shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

/// Creation input for a shipment.
///
/// Field aliases accept the Spanish names used by the existing web client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipment {
    pub ticket: String,
    #[serde(alias = "calle")]
    pub street: String,
    #[serde(alias = "numero")]
    pub number: String,
    #[serde(default, alias = "apto")]
    pub apartment: Option<String>,
    #[serde(default, alias = "esquina")]
    pub cross_street: Option<String>,
    #[serde(alias = "departamento")]
    pub department: String,
    #[serde(alias = "motivo")]
    pub reason: String,
    #[serde(default, alias = "comentarios")]
    pub comments: Option<String>,
    #[serde(alias = "telefono")]
    pub phone: String,
    #[serde(alias = "contacto")]
    pub contact_name: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewShipment {
    /// Check required fields, the department and the reason code, and
    /// return the normalized pieces of a shipment.
    ///
    /// Every failing field is reported, not only the first.
    pub fn validate(&self, reasons: &[String]) -> Result<ValidatedShipment, Vec<FieldError>> {
        let mut errors = Vec::new();

        let required = [
            ("ticket", &self.ticket),
            ("street", &self.street),
            ("number", &self.number),
            ("phone", &self.phone),
            ("contact_name", &self.contact_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(FieldError::required(field));
            }
        }

        let department = if self.department.trim().is_empty() {
            errors.push(FieldError::required("department"));
            None
        } else {
            match self.department.parse::<Department>() {
                Ok(d) => Some(d),
                Err(_) => {
                    errors.push(FieldError::new("department", "is not a valid department"));
                    None
                }
            }
        };

        let reason = self.reason.trim();
        if reason.is_empty() {
            errors.push(FieldError::required("reason"));
        } else if !reasons.iter().any(|r| r == reason) {
            errors.push(FieldError::new(
                "reason",
                format!("must be one of: {}", reasons.join(", ")),
            ));
        }

        match department {
            Some(department) if errors.is_empty() => Ok(ValidatedShipment {
                ticket: self.ticket.trim().to_string(),
                address: Address {
                    street: self.street.trim().to_string(),
                    number: self.number.trim().to_string(),
                    apartment: non_blank(self.apartment.clone()),
                    cross_street: non_blank(self.cross_street.clone()),
                    department,
                },
                contact: Contact {
                    name: self.contact_name.trim().to_string(),
                    phone: self.phone.trim().to_string(),
                },
                reason: reason.to_string(),
                comments: non_blank(self.comments.clone()),
            }),
            _ => Err(errors),
        }
    }
}

/// Output of [`NewShipment::validate`]; the only way to build a [`Shipment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedShipment {
    ticket: String,
    address: Address,
    contact: Contact,
    reason: String,
    comments: Option<String>,
}

impl ValidatedShipment {
    pub fn ticket(&self) -> &str {
        &self.ticket
    }
}

/// Data attached to a history entry, depending on the state reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetail {
    #[default]
    None,
    Delivered {
        receiver_name: String,
        receiver_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evidence_url: Option<String>,
    },
    NotDelivered {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evidence_url: Option<String>,
    },
}

impl EntryDetail {
    pub fn evidence_url(&self) -> Option<&str> {
        match self {
            EntryDetail::Delivered { evidence_url, .. }
            | EntryDetail::NotDelivered { evidence_url, .. } => evidence_url.as_deref(),
            EntryDetail::None => None,
        }
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub state: DeliveryState,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub detail: EntryDetail,
}

impl StatusHistoryEntry {
    pub fn new(state: DeliveryState, actor: &Actor, timestamp: DateTime<Utc>, detail: EntryDetail) -> Self {
        Self {
            state,
            timestamp,
            user_id: actor.user_id.clone(),
            user_name: actor.display_name.clone(),
            detail,
        }
    }
}

/// A shipment record.
///
/// `state`, `history` and `version` are only changed through
/// [`Shipment::record`], which keeps the last history entry and the current
/// state in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub ticket: String,
    pub address: Address,
    pub contact: Contact,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    state: DeliveryState,
    history: Vec<StatusHistoryEntry>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    version: u64,
}

impl Shipment {
    /// Build a new shipment in `Ingresada` with its initial history entry.
    pub fn create(fields: ValidatedShipment, creator: &Actor, now: DateTime<Utc>) -> Self {
        let initial = StatusHistoryEntry::new(DeliveryState::Ingresada, creator, now, EntryDetail::None);
        Self {
            id: ShipmentId::new(),
            ticket: fields.ticket,
            address: fields.address,
            contact: fields.contact,
            reason: fields.reason,
            comments: fields.comments,
            state: DeliveryState::Ingresada,
            history: vec![initial],
            created_by: creator.user_id.clone(),
            created_at: now,
            version: 1,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    pub fn last_entry(&self) -> Option<&StatusHistoryEntry> {
        self.history.last()
    }

    /// Optimistic concurrency token; bumped by every recorded change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of times the shipment has been handed to a courier.
    pub fn delivery_attempts(&self) -> u32 {
        self.history
            .iter()
            .filter(|e| e.state == DeliveryState::AsignadoACourier)
            .count() as u32
    }

    /// Append a history entry, move to its state and bump the version.
    ///
    /// Edge legality is checked by the lifecycle planner before calling this.
    pub fn record(&mut self, entry: StatusHistoryEntry) {
        self.state = entry.state;
        self.history.push(entry);
        self.version += 1;
    }
}
