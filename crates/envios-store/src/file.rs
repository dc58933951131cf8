use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use envios_types::{Page, Shipment, ShipmentFilter, ShipmentId};

use crate::lock::LockFile;
use crate::{ShipmentStore, StoreError};

const SHIPMENTS_DIR: &str = "shipments";

/// Filesystem store: `<data_dir>/shipments/<id>.json`, one document per
/// shipment.
///
/// Writes go to a temp file and are renamed into place. Inserts, replaces
/// and deletes run under the directory lock file, so the version check of
/// `replace` holds across processes sharing the directory.
///
/// A write that does not hold the lock within `lock_wait` of being issued
/// is abandoned without touching the record, even if the lock frees up
/// later.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    stale_lock_after: Duration,
    lock_wait: Duration,
}

impl FileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            dir: data_dir.join(SHIPMENTS_DIR),
            stale_lock_after: Duration::from_secs(30),
            lock_wait: Duration::from_secs(2),
        }
    }

    /// Override how long a lock may be held before it is considered
    /// abandoned, and how long writers wait for it. Callers that bound a
    /// write with their own timeout must allow more than `wait`.
    pub fn with_lock_timing(mut self, stale_after: Duration, wait: Duration) -> Self {
        self.stale_lock_after = stale_after;
        self.lock_wait = wait;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: ShipmentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create store dir: {}", self.dir.display()))
    }

    fn write_deadline(&self) -> Instant {
        Instant::now() + self.lock_wait
    }

    /// Take the directory lock, giving up at `deadline`. The deadline is
    /// checked again once the lock is held, since a blocking task may start
    /// late.
    fn lock(&self, deadline: Instant) -> Result<LockFile, StoreError> {
        self.ensure_dir()?;
        let wait = deadline.saturating_duration_since(Instant::now());
        let lock = LockFile::acquire_waiting(&self.dir, self.stale_lock_after, wait)?;
        if Instant::now() > deadline {
            return Err(StoreError::DeadlineExceeded(self.lock_wait));
        }
        Ok(lock)
    }

    fn write_record(&self, shipment: &Shipment) -> Result<()> {
        let path = self.record_path(shipment.id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(shipment).context("failed to serialize shipment")?;

        fs::write(&tmp_path, content).with_context(|| format!("failed to write file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| format!("failed to rename file to: {}", path.display()))?;
        Ok(())
    }

    fn read_record(&self, path: &Path) -> Result<Option<Shipment>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read file: {}", path.display())),
        };
        let shipment = serde_json::from_slice(&content)
            .with_context(|| format!("failed to parse shipment JSON from: {}", path.display()))?;
        Ok(Some(shipment))
    }

    fn read_all(&self) -> Result<Vec<Shipment>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("failed to read dir: {}", self.dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(shipment) = self.read_record(&path)?
            {
                records.push(shipment);
            }
        }
        Ok(records)
    }

    fn insert_blocking(&self, deadline: Instant, shipment: &Shipment) -> Result<(), StoreError> {
        let _lock = self.lock(deadline)?;
        if self.read_all()?.iter().any(|s| s.ticket == shipment.ticket) {
            return Err(StoreError::DuplicateTicket(shipment.ticket.clone()));
        }
        self.write_record(shipment)?;
        Ok(())
    }

    fn replace_blocking(
        &self,
        deadline: Instant,
        expected_version: u64,
        shipment: &Shipment,
    ) -> Result<(), StoreError> {
        let _lock = self.lock(deadline)?;
        let current = self
            .read_record(&self.record_path(shipment.id))?
            .ok_or(StoreError::Missing(shipment.id))?;
        if current.version() != expected_version {
            return Err(StoreError::VersionMismatch {
                id: shipment.id,
                expected: expected_version,
                found: current.version(),
            });
        }
        self.write_record(shipment)?;
        Ok(())
    }

    fn delete_blocking(&self, deadline: Instant, id: ShipmentId) -> Result<bool, StoreError> {
        let _lock = self.lock(deadline)?;
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to delete file: {}", path.display()))
                .into()),
        }
    }

    /// Run filesystem work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&FileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("file store task failed")?
    }
}

#[async_trait]
impl ShipmentStore for FileStore {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let shipment = shipment.clone();
        let deadline = self.write_deadline();
        self.blocking(move |store| store.insert_blocking(deadline, &shipment)).await
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, StoreError> {
        self.blocking(move |store| Ok(store.read_record(&store.record_path(id))?))
            .await
    }

    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<Shipment>, StoreError> {
        let ticket = ticket.to_string();
        self.blocking(move |store| Ok(store.read_all()?.into_iter().find(|s| s.ticket == ticket)))
            .await
    }

    async fn replace(&self, expected_version: u64, shipment: &Shipment) -> Result<(), StoreError> {
        let shipment = shipment.clone();
        let deadline = self.write_deadline();
        self.blocking(move |store| store.replace_blocking(deadline, expected_version, &shipment))
            .await
    }

    async fn query(&self, filter: &ShipmentFilter, page: Page) -> Result<Vec<Shipment>, StoreError> {
        let filter = filter.clone();
        self.blocking(move |store| {
            let matching = store
                .read_all()?
                .into_iter()
                .filter(|s| filter.matches(s))
                .collect();
            Ok(page.apply(matching))
        })
        .await
    }

    async fn count(&self, filter: &ShipmentFilter) -> Result<usize, StoreError> {
        let filter = filter.clone();
        self.blocking(move |store| Ok(store.read_all()?.iter().filter(|s| filter.matches(s)).count()))
            .await
    }

    async fn delete(&self, id: ShipmentId) -> Result<bool, StoreError> {
        let deadline = self.write_deadline();
        self.blocking(move |store| store.delete_blocking(deadline, id)).await
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
