//! In-memory `MetadataStore`: keyword search over a fixed field set plus
//! structured filtering (spec.md §6.2).
//!
//! `UnitMetadata` itself carries no `type`/`namespace` — those live on
//! `ExtractedUnit`. `query`/`list_by_type` here only see what's present in
//! `metadata.extra`; callers wanting authoritative type-based listing
//! should prefer `UnitStore::list_by_type`.

use crate::domain::error::Result;
use crate::domain::ports::metadata_store::{validate_keywords, KeywordHit, MetadataStore, KEYWORD_FIELDS};
use crate::domain::types::UnitMetadata;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;

pub struct InMemoryMetadataStore {
    entries: DashMap<String, UnitMetadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    fn field_value(id: &str, metadata: &UnitMetadata, field: &str) -> Vec<String> {
        match field {
            "identifier" => vec![id.to_string()],
            "method_names" => metadata.method_names.clone(),
            "association_names" => metadata.associations.clone(),
            "column_names" => metadata.column_names.clone(),
            "route_paths" => metadata.route.clone().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn filter_value(metadata: &UnitMetadata, key: &str) -> Option<Value> {
        match key {
            "importance" => metadata.importance.map(|i| Value::String(i.as_str().to_string())),
            "change_frequency" => serde_json::to_value(metadata.git.change_frequency).ok(),
            other => metadata.extra.get(other).cloned(),
        }
    }

    fn matches_filters(metadata: &UnitMetadata, filters: &BTreeMap<String, Value>) -> bool {
        filters.iter().all(|(k, v)| Self::filter_value(metadata, k).as_ref() == Some(v))
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn upsert(&self, id: &str, metadata: UnitMetadata) -> Result<()> {
        self.entries.insert(id.to_string(), metadata);
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<UnitMetadata>> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    async fn search_keywords(
        &self,
        keywords: &[String],
        fields: &[String],
        filters: &BTreeMap<String, Value>,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        validate_keywords(keywords)?;
        let search_fields: Vec<&str> = if fields.is_empty() {
            KEYWORD_FIELDS.to_vec()
        } else {
            fields.iter().map(|s| s.as_str()).filter(|f| KEYWORD_FIELDS.contains(f)).collect()
        };

        let mut hits: Vec<KeywordHit> = Vec::new();
        for entry in self.entries.iter() {
            let id = entry.key();
            let metadata = entry.value();
            if !Self::matches_filters(metadata, filters) {
                continue;
            }

            let mut matched_fields = Vec::new();
            let mut matches = 0usize;
            for field in &search_fields {
                let values = Self::field_value(id, metadata, field);
                let field_matched = keywords.iter().any(|kw| {
                    let kw_lower = kw.to_lowercase();
                    values.iter().any(|v| v.to_lowercase().contains(&kw_lower))
                });
                if field_matched {
                    matched_fields.push(field.to_string());
                    matches += 1;
                }
            }

            if matches > 0 {
                let match_score = matches as f64 / search_fields.len().max(1) as f64;
                hits.push(KeywordHit {
                    id: id.clone(),
                    match_score,
                    matched_fields,
                    metadata: metadata.clone(),
                });
            }
        }

        hits.sort_by(|a, b| b.match_score.partial_cmp(&a.match_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn query(&self, filters: &BTreeMap<String, Value>, limit: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| Self::matches_filters(entry.value(), filters))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn list_by_type(&self, unit_type: &str, limit: usize) -> Result<Vec<String>> {
        let mut filters = BTreeMap::new();
        filters.insert("type".to_string(), Value::String(unit_type.to_string()));
        self.query(&filters, limit).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }
}
