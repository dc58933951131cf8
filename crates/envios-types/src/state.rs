use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Delivery status of a shipment.
///
/// Serialized with the display names used on the wire ("Asignado a courier",
/// "No entregado", ...). The snake_case identifiers are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Registered by staff, not yet handed to a courier
    #[serde(rename = "Ingresada", alias = "ingresada")]
    Ingresada,
    /// Out with a courier
    #[serde(rename = "Asignado a courier", alias = "asignado_a_courier")]
    AsignadoACourier,
    /// Handed to the receiver (terminal)
    #[serde(rename = "Entregado", alias = "entregado")]
    Entregado,
    /// Delivery attempt failed; may be reassigned
    #[serde(rename = "No entregado", alias = "no_entregado")]
    NoEntregado,
}

impl DeliveryState {
    pub const ALL: [DeliveryState; 4] = [
        DeliveryState::Ingresada,
        DeliveryState::AsignadoACourier,
        DeliveryState::Entregado,
        DeliveryState::NoEntregado,
    ];

    /// Human-facing label, identical to the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryState::Ingresada => "Ingresada",
            DeliveryState::AsignadoACourier => "Asignado a courier",
            DeliveryState::Entregado => "Entregado",
            DeliveryState::NoEntregado => "No entregado",
        }
    }

    /// Stable machine identifier.
    pub fn id(&self) -> &'static str {
        match self {
            DeliveryState::Ingresada => "ingresada",
            DeliveryState::AsignadoACourier => "asignado_a_courier",
            DeliveryState::Entregado => "entregado",
            DeliveryState::NoEntregado => "no_entregado",
        }
    }

    /// Whether no further transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Entregado)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DeliveryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        DeliveryState::ALL
            .into_iter()
            .find(|state| {
                state.label().eq_ignore_ascii_case(needle) || state.id().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| format!("unknown delivery state: {}", s))
    }
}

/// Lifecycle events that move a shipment between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Hand the shipment to a courier (first time or after a failed attempt)
    Assign,
    /// Courier handed the shipment to the receiver
    Deliver,
    /// Courier could not deliver
    FailDeliver,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 3] = [
        LifecycleEvent::Assign,
        LifecycleEvent::Deliver,
        LifecycleEvent::FailDeliver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Assign => "assign",
            LifecycleEvent::Deliver => "deliver",
            LifecycleEvent::FailDeliver => "fail_deliver",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "assign" => Ok(LifecycleEvent::Assign),
            "deliver" => Ok(LifecycleEvent::Deliver),
            "fail_deliver" => Ok(LifecycleEvent::FailDeliver),
            _ => Err(format!("unknown lifecycle event: {}", s)),
        }
    }
}
