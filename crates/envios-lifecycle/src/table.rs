//! The transition table. Every legal edge of the delivery lifecycle is one
//! row here; nothing else in the crate decides which moves exist.

use envios_types::{DeliveryState, LifecycleEvent};
use serde::Serialize;

/// Whether a payload field may, must, or must not be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Forbidden,
    Optional,
    Required,
}

/// Payload accepted by a transition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadShape {
    /// Receiver full name and national id, together
    pub receiver: Requirement,
    pub reason: Requirement,
    pub evidence: Requirement,
}

impl PayloadShape {
    const NONE: PayloadShape = PayloadShape {
        receiver: Requirement::Forbidden,
        reason: Requirement::Forbidden,
        evidence: Requirement::Forbidden,
    };
}

/// Observable effects of a committed transition, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    PersistEvidence,
    AppendHistory,
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    pub from: DeliveryState,
    pub event: LifecycleEvent,
    pub to: DeliveryState,
    pub payload: PayloadShape,
    pub effects: &'static [SideEffect],
}

pub const TRANSITIONS: [TransitionRule; 4] = [
    TransitionRule {
        from: DeliveryState::Ingresada,
        event: LifecycleEvent::Assign,
        to: DeliveryState::AsignadoACourier,
        payload: PayloadShape::NONE,
        effects: &[SideEffect::AppendHistory, SideEffect::Notify],
    },
    TransitionRule {
        from: DeliveryState::AsignadoACourier,
        event: LifecycleEvent::Deliver,
        to: DeliveryState::Entregado,
        payload: PayloadShape {
            receiver: Requirement::Required,
            reason: Requirement::Forbidden,
            evidence: Requirement::Optional,
        },
        effects: &[
            SideEffect::PersistEvidence,
            SideEffect::AppendHistory,
            SideEffect::Notify,
        ],
    },
    TransitionRule {
        from: DeliveryState::AsignadoACourier,
        event: LifecycleEvent::FailDeliver,
        to: DeliveryState::NoEntregado,
        payload: PayloadShape {
            receiver: Requirement::Forbidden,
            reason: Requirement::Optional,
            evidence: Requirement::Optional,
        },
        effects: &[
            SideEffect::PersistEvidence,
            SideEffect::AppendHistory,
            SideEffect::Notify,
        ],
    },
    TransitionRule {
        from: DeliveryState::NoEntregado,
        event: LifecycleEvent::Assign,
        to: DeliveryState::AsignadoACourier,
        payload: PayloadShape::NONE,
        effects: &[SideEffect::AppendHistory, SideEffect::Notify],
    },
];

/// Find the edge from `from` to `to`, if one exists.
pub fn rule_for(from: DeliveryState, to: DeliveryState) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to)
}

pub fn rule_for_event(from: DeliveryState, event: LifecycleEvent) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.event == event)
}

/// States reachable in one step from `from`.
pub fn successors(from: DeliveryState) -> impl Iterator<Item = DeliveryState> {
    TRANSITIONS
        .iter()
        .filter(move |r| r.from == from)
        .map(|r| r.to)
}
