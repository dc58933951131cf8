//! Delivery lifecycle rules for envios.
//!
//! - [`table`]: the transition table, the only definition of legal moves
//! - [`LifecyclePolicy`]: which roles may fire which events, plus tunables
//! - [`plan_transition`] / [`plan_creation`]: validation and staged
//!   execution plans that the manager drives against its collaborators
//! - [`MessageTemplates`]: customer notification wording
//!
//! This crate performs no I/O.

mod error;
mod message;
mod plan;
mod policy;
pub mod table;

pub use error::LifecycleError;
pub use message::MessageTemplates;
pub use plan::{
    AwaitingEvidence, Committed, PendingCommit, ReadyTransition, Staged, TransitionPlan,
    check_evidence, plan_creation, plan_transition,
};
pub use policy::{DEFAULT_MAX_EVIDENCE_BYTES, Grant, LifecyclePolicy, PolicyRow};
pub use table::{PayloadShape, Requirement, SideEffect, TRANSITIONS, TransitionRule};
