//! Cooldown on full pipeline runs (spec.md §4.9). Incremental runs are
//! exempt — only `extract(mode=full)`/`embed(mode=full)` consult this.

use crate::domain::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullRunKind {
    Extract,
    Embed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GuardState {
    last_full_extract: Option<DateTime<Utc>>,
    last_full_embed: Option<DateTime<Utc>>,
}

/// Guards full-run cooldown. The state blob is rewritten via
/// write-to-tmp-then-rename, the same atomicity primitive the checkpoint
/// uses; an in-process mutex serializes the read-modify-write against
/// concurrent callers in this process.
pub struct PipelineGuard {
    path: PathBuf,
    cooldown: Duration,
    write_lock: Mutex<()>,
}

impl PipelineGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cooldown: DEFAULT_COOLDOWN,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Check the cooldown for `kind` and, if permitted, record this run.
    /// Returns `Cooldown` with the remaining seconds if a full run is not
    /// yet allowed.
    pub async fn check_and_record(&self, kind: FullRunKind) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = Self::load(&self.path).await?;
        let last = match kind {
            FullRunKind::Extract => state.last_full_extract,
            FullRunKind::Embed => state.last_full_embed,
        };

        let now = Utc::now();
        if let Some(last) = last {
            let elapsed = now.signed_duration_since(last).to_std().unwrap_or_default();
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return Err(Error::Cooldown {
                    remaining_secs: remaining.as_secs(),
                });
            }
        }

        match kind {
            FullRunKind::Extract => state.last_full_extract = Some(now),
            FullRunKind::Embed => state.last_full_embed = Some(now),
        }
        Self::save(&self.path, &state).await?;
        Ok(())
    }

    async fn load(path: &Path) -> Result<GuardState> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GuardState::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(path: &Path, state: &GuardState) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_full_run_is_permitted() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PipelineGuard::new(dir.path().join(".pipeline_guard.json"));
        assert!(guard.check_and_record(FullRunKind::Extract).await.is_ok());
    }

    #[tokio::test]
    async fn immediate_second_full_run_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PipelineGuard::new(dir.path().join(".pipeline_guard.json"));
        guard.check_and_record(FullRunKind::Extract).await.unwrap();
        let second = guard.check_and_record(FullRunKind::Extract).await;
        assert!(matches!(second, Err(Error::Cooldown { .. })));
    }

    #[tokio::test]
    async fn extract_and_embed_cooldowns_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PipelineGuard::new(dir.path().join(".pipeline_guard.json"));
        guard.check_and_record(FullRunKind::Extract).await.unwrap();
        assert!(guard.check_and_record(FullRunKind::Embed).await.is_ok());
    }

    #[tokio::test]
    async fn zero_cooldown_never_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PipelineGuard::new(dir.path().join(".pipeline_guard.json")).with_cooldown(Duration::from_secs(0));
        guard.check_and_record(FullRunKind::Extract).await.unwrap();
        assert!(guard.check_and_record(FullRunKind::Extract).await.is_ok());
    }
}
