use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use envios_types::MessageRecord;

/// Default message log file name
pub const MESSAGES_FILE: &str = "messages.jsonl";

pub fn messages_path(data_dir: &Path) -> PathBuf {
    data_dir.join(MESSAGES_FILE)
}

/// Append-only log of notification attempts.
///
/// File-backed logs are JSONL, one [`MessageRecord`] per line. A process
/// mutex serialises appends; lines are written with a single `write_all`
/// so readers never see a partial record from this process.
#[derive(Debug)]
pub struct MessageLog {
    path: Option<PathBuf>,
    memory: Arc<Mutex<Vec<MessageRecord>>>,
}

impl MessageLog {
    pub fn open(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            memory: Arc::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            memory: Arc::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn append(&self, record: &MessageRecord) -> Result<()> {
        let memory = Arc::clone(&self.memory);
        let path = self.path.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = memory
                .lock()
                .map_err(|_| anyhow::anyhow!("message log mutex poisoned"))?;
            match path {
                Some(path) => append_line(&path, &record),
                None => {
                    guard.push(record);
                    Ok(())
                }
            }
        })
        .await
        .context("message log task failed")?
    }

    /// Up to `limit` records, newest first.
    pub async fn read_recent(&self, limit: usize) -> Result<Vec<MessageRecord>> {
        let mut records = match &self.path {
            Some(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_all(&path))
                    .await
                    .context("message log task failed")??
            }
            None => self
                .memory
                .lock()
                .map_err(|_| anyhow::anyhow!("message log mutex poisoned"))?
                .clone(),
        };
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

fn append_line(path: &Path, record: &MessageRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create messages dir {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open messages file {}", path.display()))?;
    let mut line = serde_json::to_string(record).context("failed to serialize message to JSON")?;
    line.push('\n');
    file.write_all(line.as_bytes()).context("failed to write message line")?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<MessageRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("failed to open messages file {}", path.display()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read line from messages file {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: MessageRecord = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse message JSON from line: {}", line))?;
        records.push(record);
    }
    Ok(records)
}
