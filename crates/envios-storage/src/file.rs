use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use envios_types::{ImageKind, ShipmentId};
use sha2::{Digest, Sha256};

use crate::{EvidenceError, EvidenceStore, StorageType, StoredEvidence};

const EVIDENCE_DIR: &str = "evidence";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stores images as `<data_dir>/evidence/<shipment_id>/<sha256>.<ext>`.
///
/// References are `<public_base_url>/<shipment_id>/<file>` when a public
/// base URL is configured, otherwise `file://` URLs.
#[derive(Debug, Clone)]
pub struct FileEvidenceStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FileEvidenceStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            root: data_dir.join(EVIDENCE_DIR),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference_for(&self, relative: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{relative}"),
            None => format!("file://{}", self.root.join(relative).display()),
        }
    }

    /// Map a reference back to a path under the root.
    fn resolve(&self, reference: &str) -> Result<PathBuf, EvidenceError> {
        let relative = match &self.public_base_url {
            Some(base) => reference
                .strip_prefix(base.as_str())
                .and_then(|rest| rest.strip_prefix('/')),
            None => None,
        }
        .map(PathBuf::from)
        .or_else(|| {
            reference
                .strip_prefix("file://")
                .and_then(|path| Path::new(path).strip_prefix(&self.root).ok())
                .map(Path::to_path_buf)
        })
        .ok_or_else(|| EvidenceError::ForeignReference(reference.to_string()))?;

        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(EvidenceError::ForeignReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Write `bytes` under `relative` unless the file already exists.
    /// Returns whether this call created it.
    fn write_blocking(&self, relative: &str, bytes: &[u8]) -> Result<bool> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create evidence dir: {}", parent.display()))?;
        }
        if path.exists() {
            return Ok(false);
        }
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
        fs::write(&tmp_path, bytes).with_context(|| format!("failed to write file: {}", tmp_path.display()))?;

        // hard_link refuses to replace an existing file, so only one writer
        // of the same content wins.
        let linked = fs::hard_link(&tmp_path, &path);
        let _ = fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to link file to: {}", path.display())),
        }
    }
}

/// Relative file name for an image: shipment directory and content hash.
pub(crate) fn content_name(shipment_id: ShipmentId, kind: ImageKind, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}/{}.{}", shipment_id, digest, kind.extension())
}

#[async_trait]
impl EvidenceStore for FileEvidenceStore {
    async fn put(
        &self,
        shipment_id: ShipmentId,
        kind: ImageKind,
        bytes: &[u8],
    ) -> Result<StoredEvidence, EvidenceError> {
        let relative = content_name(shipment_id, kind, bytes);
        let store = self.clone();
        let data = bytes.to_vec();
        let name = relative.clone();
        let created = tokio::task::spawn_blocking(move || store.write_blocking(&name, &data))
            .await
            .context("evidence write task failed")??;
        tracing::debug!(%shipment_id, file = %relative, size = bytes.len(), created, "stored evidence image");
        Ok(StoredEvidence {
            url: self.reference_for(&relative),
            created,
        })
    }

    async fn delete(&self, reference: &str) -> Result<(), EvidenceError> {
        let path = self.resolve(reference)?;
        tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete file: {}", path.display())),
        })
        .await
        .context("evidence delete task failed")??;
        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool, EvidenceError> {
        Ok(self.resolve(reference)?.exists())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::File
    }
}
