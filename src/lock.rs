//! Run lock token.
//!
//! A lock file guards against overlapping runs. It holds a human-readable
//! creation marker; a token older than the TTL is treated as absent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::error::LockError;

const MARKER_PREFIX: &str = "Locked as of ";

/// Longest TTL a `chrono` duration can hold, in minutes.
const MAX_TTL_MINUTES: u64 = (i64::MAX / 60_000) as u64;

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
    ttl: ChronoDuration,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>, ttl_minutes: u64) -> Self {
        let minutes = ttl_minutes.min(MAX_TTL_MINUTES) as i64;
        Self {
            path: path.into(),
            ttl: ChronoDuration::minutes(minutes),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a token exists and was created within the TTL window before `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> Result<bool, LockError> {
        let Some(created) = self.created_at()? else {
            return Ok(false);
        };
        Ok(now.signed_duration_since(created) < self.ttl)
    }

    /// Creation time of the current token, if any.
    pub fn created_at(&self) -> Result<Option<DateTime<Utc>>, LockError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LockError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if let Some(ts) = parse_marker(&content) {
            return Ok(Some(ts));
        }

        // Unreadable marker: fall back to the file's modification time.
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| LockError::Read {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(system_time_to_utc(modified)))
    }

    /// Write the token. The returned guard owns its removal.
    pub fn acquire(&self, now: DateTime<Utc>) -> Result<LockGuard, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LockError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, format_marker(now)).map_err(|source| LockError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "lock acquired");
        Ok(LockGuard {
            path: self.path.clone(),
            released: false,
        })
    }
}

pub fn format_marker(created: DateTime<Utc>) -> String {
    format!("{MARKER_PREFIX}{}", created.to_rfc3339())
}

fn parse_marker(content: &str) -> Option<DateTime<Utc>> {
    let ts = content.trim().strip_prefix(MARKER_PREFIX)?;
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Held lock token. Released explicitly at teardown; dropping an unreleased
/// guard still removes the file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|source| LockError::Remove {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("couldn't remove lockfile {}: {e}", self.path.display());
        }
    }
}
