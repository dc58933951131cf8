use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Department, DeliveryState, Shipment};

/// Conjunctive filter over shipments. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeliveryState>,
    /// First creation day included (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    /// Last creation day included (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring of the ticket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
}

impl ShipmentFilter {
    pub fn matches(&self, shipment: &Shipment) -> bool {
        if self.department.is_some_and(|d| d != shipment.address.department) {
            return false;
        }
        if self.reason.as_deref().is_some_and(|r| r != shipment.reason) {
            return false;
        }
        if self.state.is_some_and(|s| s != shipment.state()) {
            return false;
        }
        let created = shipment.created_at.date_naive();
        if self.date_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| created > to) {
            return false;
        }
        if let Some(needle) = self.ticket.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !shipment.ticket.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Pagination window for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            skip: 0,
        }
    }
}

impl Page {
    pub fn new(limit: usize, skip: usize) -> Self {
        Self { limit, skip }
    }

    /// Sort newest first and cut the window out of `items`.
    pub fn apply(&self, mut items: Vec<Shipment>) -> Vec<Shipment> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.ticket.cmp(&b.ticket)));
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}
