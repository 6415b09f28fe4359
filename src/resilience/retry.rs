//! Wraps an [`EmbeddingProvider`] with exponential backoff retries.

use crate::domain::error::{Error, Result};
use crate::domain::ports::embedding::{EmbeddingProvider, EmbeddingVector};
use async_trait::async_trait;
use std::time::Duration;

/// Backoff schedule in seconds: 1, 2, 4, 8, capped thereafter.
const BACKOFF_SCHEDULE_SECS: [u64; 4] = [1, 2, 4, 8];

/// Retries a failing embed call with exponential backoff, up to
/// `max_attempts`. Batch calls preserve any partial results the inner
/// provider already produced rather than discarding the whole batch on a
/// single item's failure.
pub struct RetryableProvider<P> {
    inner: P,
    max_attempts: u32,
}

impl<P: EmbeddingProvider> RetryableProvider<P> {
    pub fn new(inner: P, max_attempts: u32) -> Self {
        Self { inner, max_attempts }
    }

    fn backoff_for(attempt: u32) -> Duration {
        let idx = (attempt as usize).min(BACKOFF_SCHEDULE_SECS.len() - 1);
        Duration::from_secs(BACKOFF_SCHEDULE_SECS[idx])
    }
}

#[async_trait]
impl<P: EmbeddingProvider + Send + Sync> EmbeddingProvider for RetryableProvider<P> {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut last_err = Error::internal("retry loop did not execute");
        for attempt in 0..self.max_attempts {
            match self.inner.embed(text).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    last_err = e;
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(Self::backoff_for(attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        // Preserve whatever partial results a single attempt produced;
        // only the still-missing entries get retried.
        let mut results: Vec<Option<EmbeddingVector>> = vec![None; texts.len()];
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            let pending: Vec<(usize, String)> = results
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_none())
                .map(|(i, _)| (i, texts[i].clone()))
                .collect();
            if pending.is_empty() {
                break;
            }
            let pending_texts: Vec<String> = pending.iter().map(|(_, t)| t.clone()).collect();
            match self.inner.embed_batch(&pending_texts).await {
                Ok(vectors) => {
                    for ((idx, _), vector) in pending.into_iter().zip(vectors) {
                        results[idx] = Some(vector);
                    }
                    last_err = None;
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(Self::backoff_for(attempt)).await;
                    }
                }
            }
        }

        if results.iter().all(|r| r.is_some()) {
            Ok(results.into_iter().map(|r| r.unwrap()).collect())
        } else {
            Err(last_err.unwrap_or_else(|| Error::internal("embed_batch exhausted retries")))
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn character_ceiling(&self) -> usize {
        self.inner.character_ceiling()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }
}
