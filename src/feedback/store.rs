//! Append-only JSONL feedback log, one file per UTC day (spec.md §4.11).

use crate::domain::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Helpful,
    Partial,
    Unhelpful,
    Wrong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackEntry {
    Rating {
        query: String,
        rating: Rating,
        missing: Option<String>,
        notes: Option<String>,
        recorded_at: DateTime<Utc>,
    },
    Gap {
        description: String,
        query: Option<String>,
        expected_type: Option<String>,
        expected_identifier: Option<String>,
        recorded_at: DateTime<Utc>,
    },
    /// Recorded alongside every `retrieve` call so the GapDetector has
    /// telemetry to work from beyond explicit user reports.
    RetrievalTrace {
        query: String,
        result_count: usize,
        top_score: f64,
        truncated_units: Vec<String>,
        recorded_at: DateTime<Utc>,
    },
}

impl FeedbackEntry {
    fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            Self::Rating { recorded_at, .. } => *recorded_at,
            Self::Gap { recorded_at, .. } => *recorded_at,
            Self::RetrievalTrace { recorded_at, .. } => *recorded_at,
        }
    }
}

pub struct FeedbackStore {
    dir: PathBuf,
}

impl FeedbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn append(&self, entry: &FeedbackEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for_day(entry.recorded_at().date_naive());
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Load every entry recorded in the last `days` UTC days, oldest first.
    pub async fn load_window(&self, days: u32) -> Result<Vec<FeedbackEntry>> {
        let mut entries = Vec::new();
        let today = Utc::now().date_naive();
        for offset in (0..days).rev() {
            let day = today - chrono::Duration::days(offset as i64);
            let path = self.path_for_day(day);
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            for line in String::from_utf8_lossy(&bytes).lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(entry) = serde_json::from_str::<FeedbackEntry>(line) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn path_for_day(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }
}
