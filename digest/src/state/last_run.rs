use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use crate::error::{DigestError, DigestResult};

/// Timestamp of the previous successful run, stored as one RFC 3339 line
#[derive(Debug, Clone)]
pub struct LastRunStore {
    path: PathBuf,
}

impl LastRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LastRunStore { path: path.into() }
    }

    /// `None` when there is no usable record. A missing or malformed file is never an error.
    pub async fn read(&self) -> Option<DateTime<Utc>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No last run recorded at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {}", self.path.display(), e);
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed last run {:?} in {}: {}",
                    content.trim(),
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    pub async fn write(&self, at: DateTime<Utc>) -> DigestResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DigestError::Internal(e.into()))?;
        }
        tokio::fs::write(&self.path, format!("{}\n", at.to_rfc3339()))
            .await
            .map_err(|e| {
                DigestError::Internal(anyhow::anyhow!(
                    "Could not write {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}

/// Where the search window starts: the last run if there is one, otherwise
/// `lookback_days` before `now`. A last run in the future is clamped to `now`.
pub fn query_start(
    last_run: Option<DateTime<Utc>>,
    lookback_days: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match last_run {
        Some(last_run) => last_run.min(now),
        None => now - Duration::days(lookback_days.max(0)),
    }
}
