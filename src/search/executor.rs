//! Dispatches a classified query to one or more search strategies, merges
//! and deduplicates the results, and degrades gracefully around unhealthy
//! backends (spec.md §4.4).

use crate::domain::error::{Error, Result};
use crate::domain::ports::embedding::EmbeddingProvider;
use crate::domain::ports::metadata_store::{validate_keywords, KeywordHit, MetadataStore, KEYWORD_FIELDS};
use crate::domain::ports::unit_store::UnitStore;
use crate::domain::ports::vector_store::{validate_filter_keys, VectorHit, VectorStore};
use crate::domain::types::{Candidate, CandidateSource, Classification, Intent, Scope, StrategyTag, Trace, UnitType};
use crate::graph::DependencyGraph;
use crate::resilience::CircuitBreaker;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default graph-expansion neighborhood: top-K seed candidates, depth 1.
const GRAPH_EXPANSION_TOP_K: usize = 5;
const GRAPH_EXPANSION_SCORE: f64 = 0.5;
const DIRECT_LOOKUP_SCORE: f64 = 1.0;

/// One strategy's output, in that strategy's own rank order — the input
/// the Ranker needs to compute per-strategy RRF contributions.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub name: &'static str,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub strategy: StrategyTag,
    pub outputs: Vec<StrategyOutput>,
    pub trace: Trace,
}

pub struct SearchExecutor {
    unit_store: Arc<dyn UnitStore>,
    vector_store: Arc<dyn VectorStore>,
    metadata_store: Arc<dyn MetadataStore>,
    graph: DependencyGraph,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_breaker: Arc<CircuitBreaker>,
    keyword_breaker: Arc<CircuitBreaker>,
    graph_breaker: Arc<CircuitBreaker>,
}

impl SearchExecutor {
    pub fn new(
        unit_store: Arc<dyn UnitStore>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        graph: DependencyGraph,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_breaker: Arc<CircuitBreaker>,
        keyword_breaker: Arc<CircuitBreaker>,
        graph_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            unit_store,
            vector_store,
            metadata_store,
            graph,
            embedding_provider,
            vector_breaker,
            keyword_breaker,
            graph_breaker,
        }
    }

    /// Select a strategy per the dispatch table in spec.md §4.4, execute
    /// it (degrading around unhealthy backends), and return the raw
    /// per-strategy candidate lists for the Ranker.
    pub async fn execute(&self, query: &str, classification: &Classification, limit: usize) -> Result<ExecutionResult> {
        let mut trace = Trace::default();

        let resolved_entity = self.resolve_known_entity(&classification.entities).await;

        let strategy = if classification.intent == Intent::Framework || classification.framework_context {
            StrategyTag::Framework
        } else if resolved_entity.is_some() {
            StrategyTag::DirectThenGraph
        } else if matches!(classification.intent, Intent::Reference | Intent::Locate) && classification.scope == Scope::Pinpoint {
            StrategyTag::DirectThenKeyword
        } else if classification.intent == Intent::Trace {
            if resolved_entity.is_some() {
                StrategyTag::GraphTraversal
            } else {
                StrategyTag::Hybrid
            }
        } else {
            StrategyTag::Hybrid
        };

        let outputs = match strategy {
            StrategyTag::Framework => self.run_framework(query, limit, &mut trace).await?,
            StrategyTag::DirectThenGraph => {
                self.run_direct_then_graph(resolved_entity.as_deref(), &mut trace).await?
            }
            StrategyTag::DirectThenKeyword => {
                self.run_direct_then_keyword(query, resolved_entity.as_deref(), limit, &mut trace)
                    .await?
            }
            StrategyTag::GraphTraversal => {
                self.run_graph_traversal(resolved_entity.as_deref().unwrap(), &mut trace).await?
            }
            StrategyTag::Hybrid => self.run_hybrid(query, classification, limit, &mut trace).await?,
        };

        if outputs.is_empty() {
            return Err(Error::degraded("all search strategies unavailable"));
        }

        Ok(ExecutionResult { strategy, outputs, trace })
    }

    async fn resolve_known_entity(&self, entities: &[String]) -> Option<String> {
        for entity in entities {
            if let Ok(Some(unit)) = self.unit_store.get(entity).await {
                return Some(unit.identifier);
            }
        }
        None
    }

    async fn run_framework(&self, query: &str, limit: usize, trace: &mut Trace) -> Result<Vec<StrategyOutput>> {
        let mut filters = BTreeMap::new();
        filters.insert("type".to_string(), Value::String(UnitType::Framework.as_str().to_string()));
        match self.vector_search(query, filters, limit, trace).await {
            Ok(out) => Ok(vec![out]),
            Err(e) if e.is_retryable_or_degradable() => {
                trace.downgrade_reasons.push(format!("framework vector search unavailable: {e}"));
                trace.strategies_skipped.push("vector".to_string());
                Ok(vec![])
            }
            Err(e) => Err(e),
        }
    }

    async fn run_direct_then_graph(&self, entity: Option<&str>, trace: &mut Trace) -> Result<Vec<StrategyOutput>> {
        let Some(entity) = entity else {
            return Ok(vec![]);
        };
        let mut outputs = Vec::new();
        if let Ok(Some(direct)) = self.direct_lookup(entity).await {
            outputs.push(StrategyOutput {
                name: "direct",
                candidates: vec![direct.clone()],
            });
            trace.strategies_run.push("direct".to_string());
            match self.graph_expand(&[direct], trace).await {
                Ok(expansion) => outputs.push(expansion),
                Err(e) if e.is_retryable_or_degradable() => {
                    trace.downgrade_reasons.push(format!("graph expansion unavailable: {e}"));
                    trace.strategies_skipped.push("graph_expansion".to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outputs)
    }

    async fn run_direct_then_keyword(
        &self,
        query: &str,
        entity: Option<&str>,
        limit: usize,
        trace: &mut Trace,
    ) -> Result<Vec<StrategyOutput>> {
        let mut outputs = Vec::new();
        if let Some(entity) = entity {
            if let Ok(Some(direct)) = self.direct_lookup(entity).await {
                trace.strategies_run.push("direct".to_string());
                outputs.push(StrategyOutput {
                    name: "direct",
                    candidates: vec![direct],
                });
            }
        }
        match self.keyword_search(query, limit, trace).await {
            Ok(out) => outputs.push(out),
            Err(e) if e.is_retryable_or_degradable() => {
                trace.downgrade_reasons.push(format!("keyword search unavailable: {e}"));
                trace.strategies_skipped.push("keyword".to_string());
            }
            Err(e) => return Err(e),
        }
        Ok(outputs)
    }

    async fn run_graph_traversal(&self, entity: &str, trace: &mut Trace) -> Result<Vec<StrategyOutput>> {
        let graph = self.graph.clone();
        let entity_owned = entity.to_string();
        match self
            .graph_breaker
            .call(move || async move { Ok(graph.traverse_forward(&entity_owned, 1)) })
            .await
        {
            Ok(ids) => {
                trace.strategies_run.push("graph_traversal".to_string());
                let mut candidates = Vec::new();
                for id in ids {
                    if let Ok(Some(unit)) = self.unit_store.get(&id).await {
                        candidates.push(Candidate {
                            identifier: unit.identifier,
                            score: GRAPH_EXPANSION_SCORE,
                            sources: vec![CandidateSource::GraphExpansion],
                            metadata: unit.metadata,
                            unit_type: unit.unit_type,
                            file_path: unit.file_path,
                            matched_fields: vec![],
                            expanded_from: Some(entity.to_string()),
                        });
                    }
                }
                Ok(vec![StrategyOutput {
                    name: "graph_traversal",
                    candidates,
                }])
            }
            Err(e) if e.is_retryable_or_degradable() => {
                trace.downgrade_reasons.push(format!("graph traversal unavailable: {e}"));
                trace.strategies_skipped.push("graph_traversal".to_string());
                Ok(vec![])
            }
            Err(e) => Err(e),
        }
    }

    async fn run_hybrid(&self, query: &str, classification: &Classification, limit: usize, trace: &mut Trace) -> Result<Vec<StrategyOutput>> {
        let mut outputs = Vec::new();
        let filters = self.filters_from_classification(classification);

        let vector_result = self.vector_search(query, filters.clone(), limit, trace).await;
        let keyword_result = self.keyword_search(query, limit, trace).await;

        let mut seed_candidates = Vec::new();
        match vector_result {
            Ok(out) => {
                seed_candidates.extend(out.candidates.iter().cloned());
                outputs.push(out);
            }
            Err(e) if e.is_retryable_or_degradable() => {
                trace.downgrade_reasons.push(format!("vector search unavailable: {e}"));
                trace.strategies_skipped.push("vector".to_string());
            }
            Err(e) => return Err(e),
        }
        match keyword_result {
            Ok(out) => {
                seed_candidates.extend(out.candidates.iter().cloned());
                outputs.push(out);
            }
            Err(e) if e.is_retryable_or_degradable() => {
                trace.downgrade_reasons.push(format!("keyword search unavailable: {e}"));
                trace.strategies_skipped.push("keyword".to_string());
            }
            Err(e) => return Err(e),
        }

        if !seed_candidates.is_empty() {
            seed_candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
            seed_candidates.truncate(GRAPH_EXPANSION_TOP_K);
            match self.graph_expand(&seed_candidates, trace).await {
                Ok(expansion) if !expansion.candidates.is_empty() => outputs.push(expansion),
                Ok(_) => {}
                Err(e) if e.is_retryable_or_degradable() => {
                    trace.downgrade_reasons.push(format!("graph expansion unavailable: {e}"));
                    trace.strategies_skipped.push("graph_expansion".to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outputs)
    }

    async fn direct_lookup(&self, identifier: &str) -> Result<Option<Candidate>> {
        let Some(unit) = self.unit_store.get(identifier).await? else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            identifier: unit.identifier,
            score: DIRECT_LOOKUP_SCORE,
            sources: vec![CandidateSource::Direct],
            metadata: unit.metadata,
            unit_type: unit.unit_type,
            file_path: unit.file_path,
            matched_fields: vec![],
            expanded_from: None,
        }))
    }

    async fn vector_search(
        &self,
        query: &str,
        filters: BTreeMap<String, Value>,
        limit: usize,
        trace: &mut Trace,
    ) -> Result<StrategyOutput> {
        validate_filter_keys(&filters)?;
        let embedding = self.embedding_provider.embed(query).await?;
        let vector = embedding.values;
        let hits: Vec<VectorHit> = self
            .vector_breaker
            .call(|| self.vector_store.search(&vector, &filters, limit))
            .await?;
        trace.strategies_run.push("vector".to_string());

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Ok(Some(unit)) = self.unit_store.get(&hit.id).await {
                candidates.push(Candidate {
                    identifier: unit.identifier,
                    score: hit.similarity,
                    sources: vec![CandidateSource::Vector],
                    metadata: unit.metadata,
                    unit_type: unit.unit_type,
                    file_path: unit.file_path,
                    matched_fields: vec![],
                    expanded_from: None,
                });
            }
        }
        Ok(StrategyOutput { name: "vector", candidates })
    }

    async fn keyword_search(&self, query: &str, limit: usize, trace: &mut Trace) -> Result<StrategyOutput> {
        let keywords: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_').to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        validate_keywords(&keywords)?;
        let fields: Vec<String> = KEYWORD_FIELDS.iter().map(|f| f.to_string()).collect();
        let filters = BTreeMap::new();
        let hits: Vec<KeywordHit> = self
            .keyword_breaker
            .call(|| self.metadata_store.search_keywords(&keywords, &fields, &filters, limit))
            .await?;
        trace.strategies_run.push("keyword".to_string());

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Ok(Some(unit)) = self.unit_store.get(&hit.id).await {
                candidates.push(Candidate {
                    identifier: unit.identifier,
                    score: hit.match_score,
                    sources: vec![CandidateSource::Keyword],
                    metadata: unit.metadata,
                    unit_type: unit.unit_type,
                    file_path: unit.file_path,
                    matched_fields: hit.matched_fields,
                    expanded_from: None,
                });
            }
        }
        Ok(StrategyOutput { name: "keyword", candidates })
    }

    async fn graph_expand(&self, seeds: &[Candidate], trace: &mut Trace) -> Result<StrategyOutput> {
        let seeds = seeds.to_vec();
        let graph = self.graph.clone();
        let expanded_ids: Vec<(String, String)> = self
            .graph_breaker
            .call(move || async move {
                let mut pairs = Vec::new();
                for seed in &seeds {
                    for dep in graph.dependencies_of(&seed.identifier) {
                        pairs.push((seed.identifier.clone(), dep.target_identifier));
                    }
                }
                Ok(pairs)
            })
            .await?;
        trace.strategies_run.push("graph_expansion".to_string());

        let mut candidates = Vec::new();
        for (from, id) in expanded_ids {
            if let Ok(Some(unit)) = self.unit_store.get(&id).await {
                candidates.push(Candidate {
                    identifier: unit.identifier,
                    score: GRAPH_EXPANSION_SCORE,
                    sources: vec![CandidateSource::GraphExpansion],
                    metadata: unit.metadata,
                    unit_type: unit.unit_type,
                    file_path: unit.file_path,
                    matched_fields: vec![],
                    expanded_from: Some(from),
                });
            }
        }
        Ok(StrategyOutput {
            name: "graph_expansion",
            candidates,
        })
    }

    fn filters_from_classification(&self, classification: &Classification) -> BTreeMap<String, Value> {
        let mut filters = BTreeMap::new();
        if let Some(unit_type) = target_type_as_unit_type(classification) {
            filters.insert("type".to_string(), Value::String(unit_type.as_str().to_string()));
        }
        filters
    }
}

fn target_type_as_unit_type(classification: &Classification) -> Option<UnitType> {
    use crate::domain::types::TargetType as TT;
    Some(match classification.target_type {
        TT::Model => UnitType::Model,
        TT::Controller => UnitType::Controller,
        TT::Service => UnitType::Service,
        TT::Job => UnitType::Job,
        TT::Mailer => UnitType::Mailer,
        TT::Component => UnitType::Component,
        TT::Concern => UnitType::Concern,
        TT::Framework => UnitType::Framework,
        TT::Schema => UnitType::Schema,
        TT::Route => UnitType::Route,
        TT::GraphqlType => UnitType::GraphqlType,
        TT::GraphqlMutation => UnitType::GraphqlMutation,
        TT::GraphqlResolver => UnitType::GraphqlResolver,
        TT::GraphqlQuery => UnitType::GraphqlQuery,
        TT::Unknown => return None,
    })
}

/// Merge candidates across strategy outputs by identifier: union sources
/// and matched fields, keep the max score.
pub fn merge_and_dedup(outputs: &[StrategyOutput]) -> Vec<Candidate> {
    let mut merged: BTreeMap<String, Candidate> = BTreeMap::new();
    for output in outputs {
        for candidate in &output.candidates {
            merged
                .entry(candidate.identifier.clone())
                .and_modify(|existing| existing.merge(candidate.clone()))
                .or_insert_with(|| candidate.clone());
        }
    }
    merged.into_values().collect()
}
