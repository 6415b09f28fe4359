//! System-wide advisory lock guarding write operations (extract, embed,
//! repair). Acquired via exclusive file creation — `O_EXCL` semantics, not
//! a read-then-write check — so two concurrent acquirers can never both
//! succeed (spec.md §4.9, property 9).

use crate::domain::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(3600);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockPayload {
    pub agent: String,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub heartbeat_at: DateTime<Utc>,
    pub host: String,
}

pub struct PipelineLock {
    path: PathBuf,
    stale_threshold: Duration,
}

impl PipelineLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    /// Acquire the lock for `operation`, attributed to `agent`. Fails with
    /// `LockContention` unless the existing holder's last heartbeat is
    /// older than the stale threshold *and* the holder is confirmed dead —
    /// a same-host holder whose process is still alive is never taken
    /// over, hung or not (conservative default, see DESIGN.md).
    pub async fn acquire(&self, agent: &str, operation: &str) -> Result<PipelineLockGuard> {
        match self.try_create(agent, operation).await {
            Ok(()) => {}
            Err(Error::LockContention { .. }) => {
                if self.existing_is_stale().await? {
                    warn!(path = %self.path.display(), "stale pipeline lock detected, taking over");
                    let _ = tokio::fs::remove_file(&self.path).await;
                    self.try_create(agent, operation).await?;
                } else {
                    return Err(self.contention_error().await);
                }
            }
            Err(e) => return Err(e),
        }

        let guard = PipelineLockGuard::spawn(self.path.clone(), agent.to_string(), operation.to_string());
        info!(operation, agent, "pipeline lock acquired");
        Ok(guard)
    }

    async fn try_create(&self, agent: &str, operation: &str) -> Result<()> {
        let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(self.contention_error().await);
            }
            Err(e) => return Err(e.into()),
        };
        let payload = LockPayload {
            agent: agent.to_string(),
            operation: operation.to_string(),
            started_at: Utc::now(),
            pid: std::process::id(),
            heartbeat_at: Utc::now(),
            host: hostname(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;
        file.write_all(&bytes).await?;
        Ok(())
    }

    async fn existing_is_stale(&self) -> Result<bool> {
        match self.read_payload().await? {
            Some(payload) => {
                let age = Utc::now().signed_duration_since(payload.heartbeat_at);
                if age.to_std().unwrap_or_default() <= self.stale_threshold {
                    return Ok(false);
                }
                if payload.host != hostname() {
                    // Can't probe a PID on another host; the heartbeat age is all
                    // we have, so fall back to the threshold above.
                    return Ok(true);
                }
                Ok(!process_is_alive(payload.pid))
            }
            None => Ok(true),
        }
    }

    async fn read_payload(&self) -> Result<Option<LockPayload>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn contention_error(&self) -> Error {
        match self.read_payload().await {
            Ok(Some(payload)) => Error::LockContention {
                holder: payload.agent,
                since: payload.started_at.to_rfc3339(),
            },
            _ => Error::LockContention {
                holder: "unknown".to_string(),
                since: Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Held lock: a heartbeat task refreshes `heartbeat_at` every 30s; the
/// file is removed on drop.
pub struct PipelineLockGuard {
    path: PathBuf,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl PipelineLockGuard {
    fn spawn(path: PathBuf, agent: String, operation: String) -> Self {
        let heartbeat_path = path.clone();
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                let payload = LockPayload {
                    agent: agent.clone(),
                    operation: operation.clone(),
                    started_at: Utc::now(),
                    pid: std::process::id(),
                    heartbeat_at: Utc::now(),
                    host: hostname(),
                };
                if let Ok(bytes) = serde_json::to_vec_pretty(&payload) {
                    let _ = tokio::fs::write(&heartbeat_path, bytes).await;
                }
            }
        });
        Self { path, heartbeat }
    }

    pub async fn release(self) {
        self.heartbeat.abort();
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

impl Drop for PipelineLockGuard {
    fn drop(&mut self) {
        self.heartbeat.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

/// Whether `pid` names a running process on this host. `/proc/<pid>`
/// existence is sufficient on Linux and avoids pulling in a signals crate
/// for a single zero-signal liveness probe.
fn process_is_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}
