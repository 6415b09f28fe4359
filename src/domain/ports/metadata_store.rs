//! Metadata store port: structured per-unit metadata plus keyword search
//! over an indexed field set.

use crate::domain::error::Result;
use crate::domain::types::UnitMetadata;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Fields the keyword search indexes, in descending field-priority order
/// (used to break score ties).
pub const KEYWORD_FIELDS: &[&str] = &[
    "identifier",
    "method_names",
    "association_names",
    "column_names",
    "route_paths",
];

/// Maximum characters accepted for a single keyword term, guarding against
/// ReDoS via pathological inputs before any pattern is compiled.
pub const MAX_KEYWORD_LENGTH: usize = 256;

/// A single keyword search hit.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub id: String,
    pub match_score: f64,
    pub matched_fields: Vec<String>,
    pub metadata: UnitMetadata,
}

/// Persists full unit metadata and answers structured/keyword queries
/// over it.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn upsert(&self, id: &str, metadata: UnitMetadata) -> Result<()>;
    async fn find(&self, id: &str) -> Result<Option<UnitMetadata>>;
    async fn search_keywords(
        &self,
        keywords: &[String],
        fields: &[String],
        filters: &BTreeMap<String, Value>,
        limit: usize,
    ) -> Result<Vec<KeywordHit>>;
    async fn query(&self, filters: &BTreeMap<String, Value>, limit: usize) -> Result<Vec<String>>;
    async fn list_by_type(&self, unit_type: &str, limit: usize) -> Result<Vec<String>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Reject keyword terms that are empty or exceed [`MAX_KEYWORD_LENGTH`]
/// before any implementation compiles a pattern from them.
pub fn validate_keywords(keywords: &[String]) -> Result<()> {
    for kw in keywords {
        if kw.is_empty() || kw.len() > MAX_KEYWORD_LENGTH {
            return Err(crate::domain::error::Error::validation(format!(
                "keyword term length out of bounds (1..={MAX_KEYWORD_LENGTH}): {} chars",
                kw.len()
            )));
        }
    }
    Ok(())
}
