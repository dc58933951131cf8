use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use envios_config::Config;
use envios_core::{LifecycleError, LifecycleManager, LifecyclePolicy, Timeouts};
use envios_notify::{MessageLog, RecordingNotifier};
use envios_storage::{
    EvidenceError, EvidenceStore, FileEvidenceStore, InlineEvidenceStore, StorageType, StoredEvidence,
};
use envios_store::lock::LockFile;
use envios_store::{MemoryStore, ShipmentStore, StoreError};
use envios_types::{
    Actor, DeliveryState, EntryDetail, Evidence, ImageKind, NewShipment, Page, Role, Shipment, ShipmentFilter,
    ShipmentId, TransitionPayload,
};
use tokio::sync::Barrier;

const PNG: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R',
];

/// Memory store that counts writes and can be made to fail, stall or
/// hold readers at a barrier.
#[derive(Default)]
struct SpyStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    read_gate: Mutex<Option<Arc<Barrier>>>,
}

impl SpyStore {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShipmentStore for SpyStore {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(shipment).await
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, StoreError> {
        let found = self.inner.get(id).await;
        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        found
    }

    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<Shipment>, StoreError> {
        self.inner.find_by_ticket(ticket).await
    }

    async fn replace(&self, expected_version: u64, shipment: &Shipment) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("disk full")));
        }
        self.inner.replace(expected_version, shipment).await
    }

    async fn query(&self, filter: &ShipmentFilter, page: Page) -> Result<Vec<Shipment>, StoreError> {
        self.inner.query(filter, page).await
    }

    async fn count(&self, filter: &ShipmentFilter) -> Result<usize, StoreError> {
        self.inner.count(filter).await
    }

    async fn delete(&self, id: ShipmentId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    fn location(&self) -> String {
        "spy".to_string()
    }
}

/// Evidence store wrapper that records puts and deletes.
struct SpyEvidence {
    inner: Arc<dyn EvidenceStore>,
    stored: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_puts: AtomicBool,
}

impl SpyEvidence {
    fn new(inner: Arc<dyn EvidenceStore>) -> Self {
        Self {
            inner,
            stored: Mutex::default(),
            deleted: Mutex::default(),
            fail_puts: AtomicBool::new(false),
        }
    }

    fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvidenceStore for SpyEvidence {
    async fn put(
        &self,
        shipment_id: ShipmentId,
        kind: ImageKind,
        bytes: &[u8],
    ) -> Result<StoredEvidence, EvidenceError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(EvidenceError::Backend(anyhow::anyhow!("bucket unavailable")));
        }
        let stored = self.inner.put(shipment_id, kind, bytes).await?;
        self.stored.lock().unwrap().push(stored.url.clone());
        Ok(stored)
    }

    async fn delete(&self, reference: &str) -> Result<(), EvidenceError> {
        self.deleted.lock().unwrap().push(reference.to_string());
        self.inner.delete(reference).await
    }

    async fn exists(&self, reference: &str) -> Result<bool, EvidenceError> {
        self.inner.exists(reference).await
    }

    fn storage_type(&self) -> StorageType {
        self.inner.storage_type()
    }
}

struct Harness {
    manager: LifecycleManager,
    store: Arc<SpyStore>,
    evidence: Arc<SpyEvidence>,
    notifier: Arc<RecordingNotifier>,
    messages: Arc<MessageLog>,
}

fn harness_with(evidence: Arc<dyn EvidenceStore>, notifier: RecordingNotifier, policy: LifecyclePolicy) -> Harness {
    let store = Arc::new(SpyStore::default());
    let evidence = Arc::new(SpyEvidence::new(evidence));
    let notifier = Arc::new(notifier);
    let messages = Arc::new(MessageLog::in_memory());
    let manager = LifecycleManager::new(store.clone(), evidence.clone(), notifier.clone(), messages.clone())
        .with_policy(policy)
        .with_timeouts(Timeouts {
            store: Duration::from_millis(200),
            evidence: Duration::from_millis(200),
        });
    Harness {
        manager,
        store,
        evidence,
        notifier,
        messages,
    }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(InlineEvidenceStore::new()),
        RecordingNotifier::new(),
        LifecyclePolicy::default(),
    )
}

fn admin() -> Actor {
    Actor::new("u-admin", "Administración", Role::Admin)
}

fn agent() -> Actor {
    Actor::new("u-agent", "Mostrador", Role::Agent)
}

fn courier() -> Actor {
    Actor::new("u-courier", "Repartidor Uno", Role::Courier)
}

fn fields(ticket: &str) -> NewShipment {
    NewShipment {
        ticket: ticket.to_string(),
        street: "Av. 18 de Julio".to_string(),
        number: "1234".to_string(),
        department: "Montevideo".to_string(),
        reason: "Entrega".to_string(),
        phone: "099123456".to_string(),
        contact_name: "María Pérez".to_string(),
        ..Default::default()
    }
}

async fn assigned(h: &Harness, ticket: &str) -> Shipment {
    let created = h.manager.create_shipment(&fields(ticket), &agent()).await.unwrap();
    h.manager
        .transition_shipment(
            created.id,
            DeliveryState::AsignadoACourier,
            TransitionPayload::default(),
            &courier(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn env_001_happy_path() {
    let h = harness();

    let created = h.manager.create_shipment(&fields("ENV-001"), &admin()).await.unwrap();
    assert_eq!(created.state(), DeliveryState::Ingresada);
    assert_eq!(created.history().len(), 1);

    let moving = h
        .manager
        .transition_shipment(
            created.id,
            DeliveryState::AsignadoACourier,
            TransitionPayload::default(),
            &courier(),
        )
        .await
        .unwrap();
    assert_eq!(moving.history().len(), 2);

    let done = h
        .manager
        .transition_shipment(
            created.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1.234.567-8"),
            &courier(),
        )
        .await
        .unwrap();
    assert_eq!(done.state(), DeliveryState::Entregado);
    assert_eq!(done.history().len(), 3);
    let last = done.last_entry().unwrap();
    assert_eq!(last.state, DeliveryState::Entregado);
    assert_eq!(last.user_id, "u-courier");
    assert_eq!(
        last.detail,
        EntryDetail::Delivered {
            receiver_name: "Ana".to_string(),
            receiver_id: "1.234.567-8".to_string(),
            evidence_url: None,
        }
    );

    let stored = h.manager.get_shipment(created.id).await.unwrap();
    assert_eq!(stored, done);

    h.manager.drain_notifications().await;
    let states: Vec<_> = h.notifier.sent().iter().map(|n| n.state).collect();
    assert_eq!(
        states,
        vec![
            DeliveryState::Ingresada,
            DeliveryState::AsignadoACourier,
            DeliveryState::Entregado
        ]
    );
    assert!(h.notifier.sent().iter().all(|n| n.phone == "099123456"));

    let log = h.manager.list_messages(10).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].state, DeliveryState::Entregado);
    assert!(log.iter().all(|m| m.sent));
}

#[tokio::test]
async fn empty_receiver_name_is_rejected_without_changes() {
    let h = harness();
    let before = assigned(&h, "ENV-002").await;
    let writes = h.store.writes();

    let err = h
        .manager
        .transition_shipment(
            before.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("   ", "1.234.567-8"),
            &courier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(err.fields()[0].field, "receiver_name");

    let after = h.manager.get_shipment(before.id).await.unwrap();
    assert_eq!(after.state(), DeliveryState::AsignadoACourier);
    assert_eq!(after.history().len(), before.history().len());
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test]
async fn deliver_without_receiver_names_every_missing_field() {
    let h = harness();
    let s = assigned(&h, "ENV-003").await;
    let err = h
        .manager
        .transition_shipment(s.id, DeliveryState::Entregado, TransitionPayload::default(), &courier())
        .await
        .unwrap_err();
    let names: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(names, vec!["receiver_name", "receiver_id"]);
}

#[tokio::test]
async fn unknown_shipment_has_no_side_effects() {
    let h = harness();
    let payload = TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Upload(PNG.to_vec()));

    let err = h
        .manager
        .transition_shipment(ShipmentId::new(), DeliveryState::Entregado, payload, &courier())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));

    h.manager.drain_notifications().await;
    assert_eq!(h.store.writes(), 0);
    assert!(h.evidence.stored().is_empty());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn delivered_is_final() {
    let h = harness();
    let s = assigned(&h, "ENV-004").await;
    h.manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1"),
            &courier(),
        )
        .await
        .unwrap();

    for target in DeliveryState::ALL {
        let err = h
            .manager
            .transition_shipment(s.id, target, TransitionPayload::default(), &admin())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition", "target {target}");
    }
    assert_eq!(h.manager.get_shipment(s.id).await.unwrap().history().len(), 3);
}

#[tokio::test]
async fn racing_transitions_have_one_winner() {
    let h = harness();
    let s = assigned(&h, "ENV-005").await;
    *h.store.read_gate.lock().unwrap() = Some(Arc::new(Barrier::new(2)));
    let first = courier();
    let second = courier();

    let deliver = h.manager.transition_shipment(
        s.id,
        DeliveryState::Entregado,
        TransitionPayload::delivered("Ana", "1"),
        &first,
    );
    let fail = h.manager.transition_shipment(
        s.id,
        DeliveryState::NoEntregado,
        TransitionPayload::not_delivered("Nadie en domicilio"),
        &second,
    );
    let (a, b) = tokio::join!(deliver, fail);

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), "conflict");
    assert!(loser.is_retryable());

    *h.store.read_gate.lock().unwrap() = None;
    let stored = h.manager.get_shipment(s.id).await.unwrap();
    assert_eq!(stored.history().len(), 3);
    assert_eq!(stored.last_entry().unwrap().state, stored.state());
}

#[tokio::test]
async fn uploaded_evidence_is_stored_before_commit() {
    let tmp = tempfile::tempdir().unwrap();
    let files = Arc::new(FileEvidenceStore::new(tmp.path().to_path_buf()));
    let h = harness_with(files.clone(), RecordingNotifier::new(), LifecyclePolicy::default());
    let s = assigned(&h, "ENV-006").await;

    let done = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::NoEntregado,
            TransitionPayload::not_delivered("Dirección incorrecta").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap();

    let url = done.last_entry().unwrap().detail.evidence_url().unwrap().to_string();
    assert_eq!(h.evidence.stored(), vec![url.clone()]);
    assert!(files.exists(&url).await.unwrap());
    assert!(h.evidence.deleted().is_empty());
}

#[tokio::test]
async fn failed_write_removes_stored_evidence() {
    let tmp = tempfile::tempdir().unwrap();
    let files = Arc::new(FileEvidenceStore::new(tmp.path().to_path_buf()));
    let h = harness_with(files.clone(), RecordingNotifier::new(), LifecyclePolicy::default());
    let s = assigned(&h, "ENV-007").await;
    h.manager.drain_notifications().await;
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let err = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "store_write_failure");
    assert!(err.to_string().contains("disk full"));

    let stored = h.evidence.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(h.evidence.deleted(), stored);
    assert!(!files.exists(&stored[0]).await.unwrap());

    h.manager.drain_notifications().await;
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn identical_evidence_survives_failed_write() {
    let tmp = tempfile::tempdir().unwrap();
    let files = Arc::new(FileEvidenceStore::new(tmp.path().to_path_buf()));
    let h = harness_with(files.clone(), RecordingNotifier::new(), LifecyclePolicy::default());
    let s = assigned(&h, "ENV-020").await;

    let failed = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::NoEntregado,
            TransitionPayload::not_delivered("Portón cerrado").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap();
    let first_url = failed.last_entry().unwrap().detail.evidence_url().unwrap().to_string();
    h.manager
        .transition_shipment(s.id, DeliveryState::AsignadoACourier, TransitionPayload::default(), &admin())
        .await
        .unwrap();

    h.store.fail_writes.store(true, Ordering::SeqCst);
    h.manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap_err();

    assert_eq!(h.evidence.stored(), vec![first_url.clone(), first_url.clone()]);
    assert!(h.evidence.deleted().is_empty());
    assert!(files.exists(&first_url).await.unwrap());
}

#[tokio::test]
async fn file_store_write_blocked_past_its_timeout_never_commits() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.timeouts.store = Duration::from_millis(400);
    config.store.lock_wait = Duration::from_millis(100);
    let manager = LifecycleManager::from_config(&config, tmp.path()).unwrap();
    let s = manager.create_shipment(&fields("ENV-021"), &agent()).await.unwrap();
    manager
        .transition_shipment(s.id, DeliveryState::AsignadoACourier, TransitionPayload::default(), &courier())
        .await
        .unwrap();

    let held = LockFile::acquire(&tmp.path().join("shipments")).unwrap();
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(600));
        drop(held);
    });
    let err = manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1.234.567-8").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "store_write_failure");

    release.join().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stored = manager.get_shipment(s.id).await.unwrap();
    assert_eq!(stored.state(), DeliveryState::AsignadoACourier);
    assert_eq!(stored.history().len(), 2);

    let evidence_dir = tmp.path().join("evidence").join(s.id.to_string());
    let leftovers = std::fs::read_dir(&evidence_dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);

    manager.drain_notifications().await;
    assert_eq!(manager.list_messages(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn referenced_evidence_survives_failed_write() {
    let h = harness();
    let s = assigned(&h, "ENV-008").await;
    let url = h.manager.upload_evidence_image(s.id, &PNG).await.unwrap();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    h.manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Reference(url)),
            &courier(),
        )
        .await
        .unwrap_err();
    assert!(h.evidence.deleted().is_empty());
}

#[tokio::test]
async fn evidence_failure_commits_nothing() {
    let h = harness();
    let s = assigned(&h, "ENV-009").await;
    h.manager.drain_notifications().await;
    let writes = h.store.writes();
    h.evidence.fail_puts.store(true, Ordering::SeqCst);

    let err = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Upload(PNG.to_vec())),
            &courier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "image_persist_failure");
    assert_eq!(h.store.writes(), writes);
    assert_eq!(
        h.manager.get_shipment(s.id).await.unwrap().state(),
        DeliveryState::AsignadoACourier
    );
    h.manager.drain_notifications().await;
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn slow_store_write_times_out() {
    let h = harness();
    let s = assigned(&h, "ENV-010").await;
    *h.store.write_delay.lock().unwrap() = Some(Duration::from_secs(2));

    let err = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::NoEntregado,
            TransitionPayload::default(),
            &courier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "store_write_failure");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn notifier_failure_does_not_roll_back() {
    let h = harness_with(
        Arc::new(InlineEvidenceStore::new()),
        RecordingNotifier::failing(),
        LifecyclePolicy::default(),
    );
    let s = assigned(&h, "ENV-011").await;
    assert_eq!(s.state(), DeliveryState::AsignadoACourier);

    h.manager.drain_notifications().await;
    let log = h.messages.read_recent(10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|m| !m.sent));
}

#[tokio::test]
async fn retry_limit_counts_courier_assignments() {
    let policy = LifecyclePolicy {
        max_delivery_attempts: Some(1),
        ..Default::default()
    };
    let h = harness_with(Arc::new(InlineEvidenceStore::new()), RecordingNotifier::new(), policy);
    let s = assigned(&h, "ENV-012").await;
    h.manager
        .transition_shipment(s.id, DeliveryState::NoEntregado, TransitionPayload::default(), &courier())
        .await
        .unwrap();

    let err = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::AsignadoACourier,
            TransitionPayload::default(),
            &admin(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::RetryLimitReached { attempts: 1, max: 1 });
}

#[tokio::test]
async fn roles_are_enforced() {
    let h = harness();
    let err = h.manager.create_shipment(&fields("ENV-013"), &courier()).await.unwrap_err();
    assert_eq!(err.kind(), "forbidden");

    let s = assigned(&h, "ENV-013").await;
    let err = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1"),
            &agent(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "forbidden");
}

#[tokio::test]
async fn duplicate_ticket_is_a_conflict() {
    let h = harness();
    h.manager.create_shipment(&fields("ENV-014"), &agent()).await.unwrap();
    let err = h.manager.create_shipment(&fields("ENV-014"), &agent()).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert!(err.to_string().contains("ENV-014"));
}

#[tokio::test]
async fn invalid_fields_are_all_reported() {
    let h = harness();
    let input = NewShipment {
        department: "Buenos Aires".to_string(),
        reason: "Mudanza".to_string(),
        ..fields("ENV-015")
    };
    let err = h.manager.create_shipment(&input, &agent()).await.unwrap_err();
    let names: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(names, vec!["department", "reason"]);
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn upload_checks_size_and_existence() {
    let policy = LifecyclePolicy {
        max_evidence_bytes: 16,
        ..Default::default()
    };
    let h = harness_with(Arc::new(InlineEvidenceStore::new()), RecordingNotifier::new(), policy);
    let s = assigned(&h, "ENV-016").await;

    let mut big = PNG.to_vec();
    big.push(0);
    let err = h.manager.upload_evidence_image(s.id, &big).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = h.manager.upload_evidence_image(ShipmentId::new(), &PNG).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let url = h.manager.upload_evidence_image(s.id, &PNG).await.unwrap();
    assert!(url.starts_with("data:image/png;base64,"));

    let done = h
        .manager
        .transition_shipment(
            s.id,
            DeliveryState::Entregado,
            TransitionPayload::delivered("Ana", "1").with_evidence(Evidence::Reference(url.clone())),
            &courier(),
        )
        .await
        .unwrap();
    assert_eq!(done.last_entry().unwrap().detail.evidence_url(), Some(url.as_str()));
}

#[tokio::test]
async fn tracking_query_count_and_delete() {
    let h = harness();
    let s = assigned(&h, "ENV-017").await;
    h.manager.create_shipment(&fields("ENV-018"), &agent()).await.unwrap();

    let view = h.manager.get_shipment_by_ticket(" ENV-017 ").await.unwrap();
    assert_eq!(view.ticket, "ENV-017");
    assert_eq!(view.state, DeliveryState::AsignadoACourier);
    assert_eq!(view.history.len(), 2);
    assert_eq!(
        h.manager.get_shipment_by_ticket("env-017").await.unwrap_err().kind(),
        "not_found"
    );

    let assigned_only = ShipmentFilter {
        state: Some(DeliveryState::AsignadoACourier),
        ..Default::default()
    };
    let found = h.manager.query_shipments(&assigned_only, Page::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(h.manager.count_shipments(&ShipmentFilter::default()).await.unwrap(), 2);

    let err = h.manager.delete_shipment(s.id, &agent()).await.unwrap_err();
    assert_eq!(err.kind(), "forbidden");
    h.manager.delete_shipment(s.id, &admin()).await.unwrap();
    assert_eq!(h.manager.get_shipment(s.id).await.unwrap_err().kind(), "not_found");
    assert_eq!(h.manager.count_shipments(&ShipmentFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn file_backed_manager_persists_across_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::default();

    let first = LifecycleManager::from_config(&config, tmp.path()).unwrap();
    let s = first.create_shipment(&fields("ENV-019"), &agent()).await.unwrap();
    first
        .transition_shipment(
            s.id,
            DeliveryState::AsignadoACourier,
            TransitionPayload::default(),
            &courier(),
        )
        .await
        .unwrap();
    first.drain_notifications().await;

    let second = LifecycleManager::from_config(&config, tmp.path()).unwrap();
    let view = second.get_shipment_by_ticket("ENV-019").await.unwrap();
    assert_eq!(view.state, DeliveryState::AsignadoACourier);

    let messages = second.list_messages(10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].ticket, "ENV-019");
}

#[test]
fn from_config_rejects_invalid_config() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.catalog.reasons.clear();
    let err = LifecycleManager::from_config(&config, tmp.path()).unwrap_err();
    assert!(err.to_string().contains("catalog.reasons"));
}
