//! Transition planning.
//!
//! A transition moves through three stages, each a distinct type:
//!
//! 1. [`plan_transition`] checks the edge, the role, the retry limit and the
//!    payload and yields a [`TransitionPlan`]. Nothing has happened yet.
//! 2. [`TransitionPlan::stage`] splits on evidence. Raw image bytes produce
//!    an [`AwaitingEvidence`], which only becomes a [`ReadyTransition`] once
//!    the stored image URL is attached.
//! 3. [`ReadyTransition::commit`] builds the history entry and the updated
//!    record as a [`PendingCommit`]. The notification intent is only
//!    reachable through [`PendingCommit::committed`], after the store write.

use chrono::{DateTime, Utc};
use envios_types::{
    Actor, DeliveryState, EntryDetail, Evidence, FieldError, ImageKind, LifecycleEvent,
    NewShipment, NotificationIntent, Shipment, ShipmentId, StatusHistoryEntry, TransitionPayload,
};

use crate::table::{Requirement, TransitionRule, rule_for};
use crate::{LifecycleError, LifecyclePolicy, MessageTemplates};

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn not_accepted(field: &str) -> FieldError {
    FieldError::new(field, "is not accepted for this transition")
}

/// Check an evidence image against the size limit and accepted formats.
pub fn check_evidence(bytes: &[u8], max_bytes: usize) -> Result<ImageKind, FieldError> {
    if bytes.is_empty() {
        return Err(FieldError::new("evidence", "is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(FieldError::new(
            "evidence",
            format!("exceeds the {max_bytes} byte limit"),
        ));
    }
    ImageKind::sniff(bytes)
        .ok_or_else(|| FieldError::new("evidence", "is not a supported image (png, jpeg, gif, webp)"))
}

#[derive(Debug, Clone)]
enum PlannedDetail {
    None,
    Delivered {
        receiver_name: String,
        receiver_id: String,
    },
    NotDelivered {
        reason: Option<String>,
    },
}

impl PlannedDetail {
    fn into_entry(self, evidence_url: Option<String>) -> EntryDetail {
        match self {
            PlannedDetail::None => EntryDetail::None,
            PlannedDetail::Delivered {
                receiver_name,
                receiver_id,
            } => EntryDetail::Delivered {
                receiver_name,
                receiver_id,
                evidence_url,
            },
            PlannedDetail::NotDelivered { reason } => EntryDetail::NotDelivered {
                reason,
                evidence_url,
            },
        }
    }
}

#[derive(Debug)]
enum PlannedEvidence {
    Upload { bytes: Vec<u8>, kind: ImageKind },
    Reference(String),
}

/// A validated transition that has not touched any collaborator yet.
#[derive(Debug)]
pub struct TransitionPlan {
    shipment: Shipment,
    rule: &'static TransitionRule,
    actor: Actor,
    detail: PlannedDetail,
    evidence: Option<PlannedEvidence>,
}

/// Validate a requested transition of `shipment` to `target`.
///
/// Checks run in a fixed order: table edge, role policy, retry limit,
/// payload. The first failing check decides the error.
pub fn plan_transition(
    shipment: Shipment,
    target: DeliveryState,
    payload: TransitionPayload,
    actor: &Actor,
    policy: &LifecyclePolicy,
) -> Result<TransitionPlan, LifecycleError> {
    let from = shipment.state();
    let rule = rule_for(from, target).ok_or(LifecycleError::InvalidTransition { from, to: target })?;

    if !policy.can_transition(actor.role, from, rule.event) {
        return Err(LifecycleError::Forbidden {
            role: actor.role,
            action: format!("{} from {}", rule.event, from),
        });
    }

    if from == DeliveryState::NoEntregado && rule.event == LifecycleEvent::Assign {
        let attempts = shipment.delivery_attempts();
        if let Some(max) = policy.max_delivery_attempts.filter(|max| attempts >= *max) {
            return Err(LifecycleError::RetryLimitReached { attempts, max });
        }
    }

    let (detail, evidence) = validate_payload(rule, payload, policy).map_err(LifecycleError::Validation)?;

    Ok(TransitionPlan {
        shipment,
        rule,
        actor: actor.clone(),
        detail,
        evidence,
    })
}

fn validate_payload(
    rule: &TransitionRule,
    payload: TransitionPayload,
    policy: &LifecyclePolicy,
) -> Result<(PlannedDetail, Option<PlannedEvidence>), Vec<FieldError>> {
    let mut errors = Vec::new();
    let shape = rule.payload;

    let receiver_name = present(&payload.receiver_name).map(str::to_string);
    let receiver_id = present(&payload.receiver_id).map(str::to_string);
    match shape.receiver {
        Requirement::Required => {
            if receiver_name.is_none() {
                errors.push(FieldError::required("receiver_name"));
            }
            if receiver_id.is_none() {
                errors.push(FieldError::required("receiver_id"));
            }
        }
        Requirement::Forbidden => {
            if receiver_name.is_some() {
                errors.push(not_accepted("receiver_name"));
            }
            if receiver_id.is_some() {
                errors.push(not_accepted("receiver_id"));
            }
        }
        Requirement::Optional => {}
    }

    let reason = present(&payload.reason).map(str::to_string);
    let reason_rule = match shape.reason {
        Requirement::Optional if rule.event == LifecycleEvent::FailDeliver && policy.require_failure_reason => {
            Requirement::Required
        }
        other => other,
    };
    match reason_rule {
        Requirement::Required if reason.is_none() => errors.push(FieldError::required("reason")),
        Requirement::Forbidden if reason.is_some() => errors.push(not_accepted("reason")),
        _ => {}
    }

    let evidence = match (shape.evidence, payload.evidence) {
        (_, None) => None,
        (Requirement::Forbidden, Some(_)) => {
            errors.push(not_accepted("evidence"));
            None
        }
        (_, Some(Evidence::Upload(bytes))) => match check_evidence(&bytes, policy.max_evidence_bytes) {
            Ok(kind) => Some(PlannedEvidence::Upload { bytes, kind }),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        (_, Some(Evidence::Reference(url))) => {
            let url = url.trim();
            if url.is_empty() {
                errors.push(FieldError::new("evidence", "reference is empty"));
                None
            } else {
                Some(PlannedEvidence::Reference(url.to_string()))
            }
        }
    };
    if shape.evidence == Requirement::Required && evidence.is_none() && errors.is_empty() {
        errors.push(FieldError::required("evidence"));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let detail = match rule.to {
        DeliveryState::Entregado => match (receiver_name, receiver_id) {
            (Some(receiver_name), Some(receiver_id)) => PlannedDetail::Delivered {
                receiver_name,
                receiver_id,
            },
            _ => return Err(vec![FieldError::required("receiver_name")]),
        },
        DeliveryState::NoEntregado => PlannedDetail::NotDelivered { reason },
        _ => PlannedDetail::None,
    };
    Ok((detail, evidence))
}

/// Result of [`TransitionPlan::stage`].
#[derive(Debug)]
pub enum Staged {
    Ready(ReadyTransition),
    AwaitingEvidence(AwaitingEvidence),
}

impl TransitionPlan {
    pub fn shipment(&self) -> &Shipment {
        &self.shipment
    }

    pub fn rule(&self) -> &'static TransitionRule {
        self.rule
    }

    pub fn stage(self) -> Staged {
        let (evidence_url, upload) = match self.evidence {
            None => (None, None),
            Some(PlannedEvidence::Reference(url)) => (Some(url), None),
            Some(PlannedEvidence::Upload { bytes, kind }) => (None, Some((bytes, kind))),
        };
        let ready = ReadyTransition {
            shipment: self.shipment,
            rule: self.rule,
            actor: self.actor,
            detail: self.detail,
            evidence_url,
            uploaded: false,
        };
        match upload {
            None => Staged::Ready(ready),
            Some((bytes, kind)) => Staged::AwaitingEvidence(AwaitingEvidence {
                inner: ready,
                bytes,
                kind,
            }),
        }
    }
}

/// A transition blocked on storing its evidence image.
#[derive(Debug)]
pub struct AwaitingEvidence {
    inner: ReadyTransition,
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl AwaitingEvidence {
    pub fn shipment_id(&self) -> ShipmentId {
        self.inner.shipment.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Attach the reference of an image this transition wrote. It is
    /// removed again if the commit fails.
    pub fn attach(self, url: String) -> ReadyTransition {
        ReadyTransition {
            evidence_url: Some(url),
            uploaded: true,
            ..self.inner
        }
    }

    /// Attach a reference the image store already held before this
    /// transition. It is never removed on a failed commit.
    pub fn attach_existing(self, url: String) -> ReadyTransition {
        ReadyTransition {
            evidence_url: Some(url),
            uploaded: false,
            ..self.inner
        }
    }
}

/// A transition with every input resolved, ready to be written.
#[derive(Debug)]
pub struct ReadyTransition {
    shipment: Shipment,
    rule: &'static TransitionRule,
    actor: Actor,
    detail: PlannedDetail,
    evidence_url: Option<String>,
    uploaded: bool,
}

impl ReadyTransition {
    pub fn commit(self, now: DateTime<Utc>, templates: &MessageTemplates) -> PendingCommit {
        let mut shipment = self.shipment;
        let expected_version = shipment.version();
        let stored_evidence = self.evidence_url.clone().filter(|_| self.uploaded);
        let entry = StatusHistoryEntry::new(
            self.rule.to,
            &self.actor,
            now,
            self.detail.into_entry(self.evidence_url),
        );
        shipment.record(entry);
        let notice = templates.notification_for(&shipment);
        PendingCommit {
            shipment,
            expected_version,
            stored_evidence,
            notice,
        }
    }
}

/// Build the pending insert for a new shipment.
///
/// The role check runs before field validation.
pub fn plan_creation(
    fields: &NewShipment,
    actor: &Actor,
    policy: &LifecyclePolicy,
    reasons: &[String],
    now: DateTime<Utc>,
    templates: &MessageTemplates,
) -> Result<PendingCommit, LifecycleError> {
    if !policy.can_create(actor.role) {
        return Err(LifecycleError::Forbidden {
            role: actor.role,
            action: "create shipments".to_string(),
        });
    }
    let valid = fields.validate(reasons).map_err(LifecycleError::Validation)?;
    let shipment = Shipment::create(valid, actor, now);
    let notice = templates.notification_for(&shipment);
    Ok(PendingCommit {
        shipment,
        expected_version: 0,
        stored_evidence: None,
        notice,
    })
}

/// An updated record waiting for the store write.
#[derive(Debug)]
pub struct PendingCommit {
    shipment: Shipment,
    expected_version: u64,
    stored_evidence: Option<String>,
    notice: NotificationIntent,
}

impl PendingCommit {
    /// The record to write.
    pub fn record(&self) -> &Shipment {
        &self.shipment
    }

    /// Version the stored record must still have; 0 for a new record.
    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }

    pub fn is_new(&self) -> bool {
        self.expected_version == 0
    }

    /// Evidence stored for this transition, to be removed if the write fails.
    pub fn stored_evidence(&self) -> Option<&str> {
        self.stored_evidence.as_deref()
    }

    /// Mark the write as done.
    pub fn committed(self) -> Committed {
        Committed {
            shipment: self.shipment,
            notice: self.notice,
        }
    }
}

/// A written transition and the notification it owes.
#[derive(Debug)]
pub struct Committed {
    shipment: Shipment,
    notice: NotificationIntent,
}

impl Committed {
    pub fn shipment(&self) -> &Shipment {
        &self.shipment
    }

    pub fn into_parts(self) -> (Shipment, NotificationIntent) {
        (self.shipment, self.notice)
    }
}
