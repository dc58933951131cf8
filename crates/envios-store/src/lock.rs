//! Lock file serialising writers of a store directory.
//!
//! The lock file lives at `<dir>/lock` and holds JSON metadata about the
//! holder (PID, hostname, timestamp). It is created with `create_new`, so
//! two processes cannot both hold it. Locks older than the stale threshold
//! are taken over.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOCK_FILE: &str = "lock";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Information stored in the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            acquired_at: Utc::now(),
        }
    }
}

/// Lock file handle that releases on Drop
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    /// Acquire the lock once, failing if it is held.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create store dir {}", dir.display()))?;

        let path = lock_path(dir);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_lock_info_from_path(&path) {
                Ok(info) => bail!(
                    "lock already held by pid {} on {} since {}",
                    info.pid,
                    info.hostname,
                    info.acquired_at
                ),
                Err(_) => bail!("lock already held ({} is being written)", path.display()),
            },
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create lock file {}", path.display()));
            }
        };

        let lock = Self { path, held: true };
        let json = serde_json::to_string_pretty(&LockInfo::current()).context("failed to serialize lock info")?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("failed to write lock file {}", lock.path.display()))?;
        file.sync_all().context("failed to sync lock file")?;
        Ok(lock)
    }

    /// Acquire the lock, first removing it if it is older than `stale_after`.
    pub fn acquire_with_timeout(dir: &Path, stale_after: Duration) -> Result<Self> {
        let path = lock_path(dir);
        if path.exists() && is_stale(&path, stale_after) {
            tracing::warn!(lock = %path.display(), "removing stale store lock");
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to remove stale lock file {}", path.display()));
                }
            }
        }
        Self::acquire(dir)
    }

    /// Keep trying [`LockFile::acquire_with_timeout`] until `wait` elapses.
    pub fn acquire_waiting(dir: &Path, stale_after: Duration, wait: Duration) -> Result<Self> {
        let deadline = Instant::now() + wait;
        loop {
            match Self::acquire_with_timeout(dir, stale_after) {
                Ok(lock) => return Ok(lock),
                Err(e) if Instant::now() >= deadline => {
                    return Err(e.context(format!("timed out after {:?} waiting for store lock", wait)));
                }
                Err(_) => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    pub fn release(&mut self) -> Result<()> {
        if self.held {
            self.held = false;
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove lock file {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn read_lock_info(dir: &Path) -> Result<LockInfo> {
        read_lock_info_from_path(&lock_path(dir))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// A lock is stale when its recorded age, or the file age if the content is
/// unreadable, exceeds `stale_after`.
fn is_stale(path: &Path, stale_after: Duration) -> bool {
    match read_lock_info_from_path(path) {
        Ok(info) => {
            let age = Utc::now() - info.acquired_at;
            age.num_milliseconds().unsigned_abs() > stale_after.as_millis() as u64
        }
        Err(_) => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after),
    }
}

fn read_lock_info_from_path(path: &Path) -> Result<LockInfo> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read lock file {}", path.display()))?;
    let info: LockInfo = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse lock JSON from {}", path.display()))?;
    Ok(info)
}

pub fn lock_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE)
}
