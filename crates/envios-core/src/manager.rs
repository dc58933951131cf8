use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use envios_config::{Config, TimeoutsConfig};
use envios_lifecycle::{
    LifecycleError, LifecyclePolicy, MessageTemplates, PendingCommit, PolicyRow, Staged, check_evidence,
    plan_creation, plan_transition,
};
use envios_notify::{LogNotifier, MessageLog, Notifier, NotifierKind, WebhookNotifier, dispatch, messages_path};
use envios_storage::{EvidenceStore, FileEvidenceStore, InlineEvidenceStore, StorageType};
use envios_store::{FileStore, MemoryStore, ShipmentStore, StoreError, StoreKind};
use envios_types::{
    Actor, DeliveryState, Department, MessageRecord, NewShipment, NotificationIntent, Page, Shipment,
    ShipmentFilter, ShipmentId, TrackingView, TransitionPayload, default_reasons,
};
use serde::Serialize;
use tokio::task::JoinHandle;

/// Upper bounds for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store: Duration,
    pub evidence: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        TimeoutsConfig::default().into()
    }
}

impl From<TimeoutsConfig> for Timeouts {
    fn from(config: TimeoutsConfig) -> Self {
        Self {
            store: config.store,
            evidence: config.evidence,
        }
    }
}

/// Reference data clients need to fill in a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub departments: Vec<Department>,
    pub reasons: Vec<String>,
}

/// Failure of a bounded collaborator call.
enum CallError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Failed(e) => write!(f, "{e:#}"),
            CallError::TimedOut(limit) => write!(f, "timed out after {limit:?}"),
        }
    }
}

async fn bounded<T, E>(limit: Duration, call: impl Future<Output = Result<T, E>>) -> Result<T, CallError<E>> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(CallError::Failed),
        Err(_) => Err(CallError::TimedOut(limit)),
    }
}

fn read_failure<E: fmt::Display>(e: CallError<E>) -> LifecycleError {
    LifecycleError::StoreReadFailure(e.to_string())
}

fn write_failure(e: CallError<StoreError>) -> LifecycleError {
    match e {
        CallError::Failed(StoreError::DuplicateTicket(ticket)) => {
            LifecycleError::Conflict(format!("ticket {ticket} is already registered"))
        }
        CallError::Failed(StoreError::VersionMismatch { id, .. }) => {
            LifecycleError::Conflict(format!("shipment {id} was modified by another request"))
        }
        CallError::Failed(StoreError::Missing(id)) => LifecycleError::NotFound(id.to_string()),
        other => LifecycleError::StoreWriteFailure(other.to_string()),
    }
}

/// Drives shipments through their lifecycle against the configured stores.
pub struct LifecycleManager {
    store: Arc<dyn ShipmentStore>,
    evidence: Arc<dyn EvidenceStore>,
    notifier: Arc<dyn Notifier>,
    messages: Arc<MessageLog>,
    policy: LifecyclePolicy,
    reasons: Vec<String>,
    templates: MessageTemplates,
    timeouts: Timeouts,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("store", &self.store.location())
            .field("evidence", &self.evidence.storage_type())
            .field("notifier", &self.notifier.name())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Manager with the default policy, reason catalog and timeouts.
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        evidence: Arc<dyn EvidenceStore>,
        notifier: Arc<dyn Notifier>,
        messages: Arc<MessageLog>,
    ) -> Self {
        Self {
            store,
            evidence,
            notifier,
            messages,
            policy: LifecyclePolicy::default(),
            reasons: default_reasons(),
            templates: MessageTemplates::default(),
            timeouts: Timeouts::default(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reasons(mut self, reasons: Vec<String>) -> Self {
        self.reasons = reasons;
        self
    }

    pub fn with_templates(mut self, templates: MessageTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the backends named by `config`, rooted at `data_dir`.
    pub fn from_config(config: &Config, data_dir: &Path) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn ShipmentStore> = match config.store.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => Arc::new(
                FileStore::new(data_dir.to_path_buf())
                    .with_lock_timing(config.store.stale_lock_after, config.store.lock_wait),
            ),
        };
        let messages = match config.store.kind {
            StoreKind::Memory => MessageLog::in_memory(),
            StoreKind::File => MessageLog::open(messages_path(data_dir)),
        };

        let evidence: Arc<dyn EvidenceStore> = match config.evidence.backend {
            StorageType::Inline => Arc::new(InlineEvidenceStore::new()),
            StorageType::File => {
                let files = FileEvidenceStore::new(data_dir.to_path_buf());
                match &config.evidence.public_base_url {
                    Some(base) => Arc::new(files.with_public_base_url(base.clone())),
                    None => Arc::new(files),
                }
            }
        };

        let notifier: Arc<dyn Notifier> = match config.notify.kind {
            NotifierKind::Log => Arc::new(LogNotifier),
            NotifierKind::Webhook => Arc::new(WebhookNotifier::new(&config.notify.webhook)?),
        };

        Ok(Self::new(store, evidence, notifier, Arc::new(messages))
            .with_policy(config.policy.clone())
            .with_reasons(config.catalog.reasons.clone())
            .with_templates(MessageTemplates::new(config.notify.tracking_base_url.clone()))
            .with_timeouts(config.timeouts.clone().into()))
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// The role-to-transition table in effect.
    pub fn policy_rows(&self) -> Vec<PolicyRow> {
        self.policy.rows()
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            departments: Department::ALL.to_vec(),
            reasons: self.reasons.clone(),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Register a new shipment in state `Ingresada`.
    pub async fn create_shipment(&self, fields: &NewShipment, actor: &Actor) -> Result<Shipment, LifecycleError> {
        let pending = plan_creation(fields, actor, &self.policy, &self.reasons, Utc::now(), &self.templates)?;
        bounded(self.timeouts.store, self.store.insert(pending.record()))
            .await
            .map_err(write_failure)?;

        let (shipment, notice) = pending.committed().into_parts();
        tracing::info!(
            ticket = %shipment.ticket,
            shipment_id = %shipment.id,
            user = %actor.user_id,
            "shipment registered"
        );
        self.notify(notice);
        Ok(shipment)
    }

    /// Move a shipment to `target`.
    ///
    /// Evidence bytes in `payload` are stored before the record is written;
    /// they are removed again if the write fails. The customer notification
    /// is dispatched only after the write succeeds.
    pub async fn transition_shipment(
        &self,
        id: ShipmentId,
        target: DeliveryState,
        payload: TransitionPayload,
        actor: &Actor,
    ) -> Result<Shipment, LifecycleError> {
        let current = self.load(id).await?;
        let plan = plan_transition(current, target, payload, actor, &self.policy)?;
        let event = plan.rule().event;
        let from = plan.rule().from;

        let ready = match plan.stage() {
            Staged::Ready(ready) => ready,
            Staged::AwaitingEvidence(awaiting) => {
                let stored = bounded(
                    self.timeouts.evidence,
                    self.evidence.put(awaiting.shipment_id(), awaiting.kind(), awaiting.bytes()),
                )
                .await
                .map_err(|e| LifecycleError::ImagePersistFailure(e.to_string()))?;
                tracing::debug!(shipment_id = %id, evidence = %stored.url, created = stored.created, "evidence stored");
                if stored.created {
                    awaiting.attach(stored.url)
                } else {
                    awaiting.attach_existing(stored.url)
                }
            }
        };

        let pending = ready.commit(Utc::now(), &self.templates);
        if let Err(e) = self.write(&pending).await {
            self.discard_evidence(&pending).await;
            tracing::warn!(shipment_id = %id, event = %event, error = %e, "transition not committed");
            return Err(e);
        }

        let (shipment, notice) = pending.committed().into_parts();
        tracing::info!(
            ticket = %shipment.ticket,
            shipment_id = %shipment.id,
            event = %event,
            from = %from,
            to = %shipment.state(),
            user = %actor.user_id,
            "shipment transitioned"
        );
        self.notify(notice);
        Ok(shipment)
    }

    /// Public tracking view for an exact ticket.
    pub async fn get_shipment_by_ticket(&self, ticket: &str) -> Result<TrackingView, LifecycleError> {
        let ticket = ticket.trim();
        bounded(self.timeouts.store, self.store.find_by_ticket(ticket))
            .await
            .map_err(read_failure)?
            .map(|s| TrackingView::from(&s))
            .ok_or_else(|| LifecycleError::NotFound(ticket.to_string()))
    }

    pub async fn get_shipment(&self, id: ShipmentId) -> Result<Shipment, LifecycleError> {
        self.load(id).await
    }

    pub async fn query_shipments(&self, filter: &ShipmentFilter, page: Page) -> Result<Vec<Shipment>, LifecycleError> {
        bounded(self.timeouts.store, self.store.query(filter, page))
            .await
            .map_err(read_failure)
    }

    pub async fn count_shipments(&self, filter: &ShipmentFilter) -> Result<usize, LifecycleError> {
        bounded(self.timeouts.store, self.store.count(filter))
            .await
            .map_err(read_failure)
    }

    /// Store an evidence image ahead of a transition and return its reference.
    pub async fn upload_evidence_image(&self, id: ShipmentId, bytes: &[u8]) -> Result<String, LifecycleError> {
        let kind = check_evidence(bytes, self.policy.max_evidence_bytes)
            .map_err(|e| LifecycleError::Validation(vec![e]))?;
        self.load(id).await?;
        let stored = bounded(self.timeouts.evidence, self.evidence.put(id, kind, bytes))
            .await
            .map_err(|e| LifecycleError::ImagePersistFailure(e.to_string()))?;
        tracing::info!(shipment_id = %id, size = bytes.len(), kind = kind.mime(), "evidence uploaded");
        Ok(stored.url)
    }

    /// Remove a shipment record. Stored evidence is left in place.
    pub async fn delete_shipment(&self, id: ShipmentId, actor: &Actor) -> Result<(), LifecycleError> {
        if !self.policy.can_delete(actor.role) {
            return Err(LifecycleError::Forbidden {
                role: actor.role,
                action: "delete shipments".to_string(),
            });
        }
        let existed = bounded(self.timeouts.store, self.store.delete(id))
            .await
            .map_err(write_failure)?;
        if !existed {
            return Err(LifecycleError::NotFound(id.to_string()));
        }
        tracing::info!(shipment_id = %id, user = %actor.user_id, "shipment deleted");
        Ok(())
    }

    /// Most recent notification attempts, newest first.
    pub async fn list_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, LifecycleError> {
        bounded(self.timeouts.store, self.messages.read_recent(limit))
            .await
            .map_err(read_failure)
    }

    /// Wait for every dispatched notification to finish.
    pub async fn drain_notifications(&self) {
        let handles = match self.in_flight.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "notification task failed");
            }
        }
    }

    async fn load(&self, id: ShipmentId) -> Result<Shipment, LifecycleError> {
        bounded(self.timeouts.store, self.store.get(id))
            .await
            .map_err(read_failure)?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    async fn write(&self, pending: &PendingCommit) -> Result<(), LifecycleError> {
        let call = self.store.replace(pending.expected_version(), pending.record());
        bounded(self.timeouts.store, call).await.map_err(write_failure)
    }

    async fn discard_evidence(&self, pending: &PendingCommit) {
        let Some(url) = pending.stored_evidence() else {
            return;
        };
        match bounded(self.timeouts.evidence, self.evidence.delete(url)).await {
            Ok(()) => tracing::debug!(evidence = %url, "orphaned evidence removed"),
            Err(e) => tracing::warn!(evidence = %url, error = %e, "failed to remove orphaned evidence"),
        }
    }

    fn notify(&self, intent: NotificationIntent) {
        let handle = dispatch(self.notifier.clone(), self.messages.clone(), intent);
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}
