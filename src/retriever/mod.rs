//! Single entry point into the retrieval pipeline: classify, select a
//! strategy, execute, rank, and assemble (spec.md §4.8). Every operation
//! forwards the per-call budget to the [`ContextAssembler`] rather than
//! hardcoding one.

use crate::context::ContextAssembler;
use crate::domain::error::{Error, Result};
use crate::domain::ports::metadata_store::MetadataStore;
use crate::domain::ports::unit_store::UnitStore;
use crate::domain::types::{
    Candidate, CandidateSource, Classification, Intent, RetrievalResult, Scope, StrategyTag, TargetType, Trace,
};
use crate::graph::DependencyGraph;
use crate::query::QueryClassifier;
use crate::search::{merge_and_dedup, RankedCandidate, Ranker, SearchExecutor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default top-N results pulled from each strategy before ranking.
const DEFAULT_STRATEGY_LIMIT: usize = 20;

pub struct Retriever {
    unit_store: Arc<dyn UnitStore>,
    metadata_store: Arc<dyn MetadataStore>,
    graph: DependencyGraph,
    executor: SearchExecutor,
    ranker: Ranker,
    assembler: ContextAssembler,
}

impl Retriever {
    pub fn new(
        unit_store: Arc<dyn UnitStore>,
        metadata_store: Arc<dyn MetadataStore>,
        graph: DependencyGraph,
        executor: SearchExecutor,
        ranker: Ranker,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            unit_store,
            metadata_store,
            graph,
            executor,
            ranker,
            assembler,
        }
    }

    /// Classify → select strategy → execute → rank → assemble.
    pub async fn retrieve(&self, query: &str, budget: Option<u32>) -> Result<RetrievalResult> {
        let classification = QueryClassifier::classify(query);
        let execution = self.executor.execute(query, &classification, DEFAULT_STRATEGY_LIMIT).await?;
        let merged = merge_and_dedup(&execution.outputs);
        let ranked = self.ranker.rank(merged, &execution.outputs, &classification).await?;

        let mut result = self.assembler.assemble(ranked, budget, execution.trace).await?;
        result.classification = Some(classification);
        result.strategy = Some(execution.strategy);
        Ok(result)
    }

    /// Direct fetch by identifier; never runs the ranker (spec.md scenario S2).
    pub async fn lookup(&self, identifier: &str, budget: Option<u32>) -> Result<RetrievalResult> {
        let unit = self
            .unit_store
            .get(identifier)
            .await?
            .ok_or_else(|| Error::not_found(identifier.to_string()))?;
        let candidate = RankedCandidate {
            candidate: Candidate {
                identifier: unit.identifier,
                score: 1.0,
                sources: vec![CandidateSource::Direct],
                metadata: unit.metadata,
                unit_type: unit.unit_type,
                file_path: unit.file_path,
                matched_fields: vec![],
                expanded_from: None,
            },
            final_score: 1.0,
        };
        let mut trace = Trace::default();
        trace.strategies_run.push("direct".to_string());
        let mut result = self.assembler.assemble(vec![candidate], budget, trace).await?;
        result.strategy = Some(StrategyTag::DirectThenGraph);
        Ok(result)
    }

    /// Raw keyword search (operator tool `search`), bypassing the
    /// classifier entirely — the caller names the keywords directly.
    pub async fn search(
        &self,
        keywords: &[String],
        fields: &[String],
        filters: &BTreeMap<String, Value>,
        budget: Option<u32>,
    ) -> Result<RetrievalResult> {
        let hits = self.metadata_store.search_keywords(keywords, fields, filters, DEFAULT_STRATEGY_LIMIT).await?;
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(unit) = self.unit_store.get(&hit.id).await? else {
                continue;
            };
            candidates.push(RankedCandidate {
                candidate: Candidate {
                    identifier: hit.id,
                    score: hit.match_score,
                    sources: vec![CandidateSource::Keyword],
                    metadata: hit.metadata,
                    unit_type: unit.unit_type,
                    file_path: unit.file_path,
                    matched_fields: hit.matched_fields,
                    expanded_from: None,
                },
                final_score: hit.match_score,
            });
        }
        let mut trace = Trace::default();
        trace.strategies_run.push("keyword".to_string());
        let mut result = self.assembler.assemble(candidates, budget, trace).await?;
        result.strategy = Some(StrategyTag::DirectThenKeyword);
        Ok(result)
    }

    /// Explicit framework-documentation lookup (operator tool
    /// `framework`), forcing the Framework strategy rather than relying
    /// on the classifier to detect framework intent.
    pub async fn framework(&self, concept: &str, gem: Option<&str>, budget: Option<u32>) -> Result<RetrievalResult> {
        let mut entities = vec![concept.to_string()];
        if let Some(gem) = gem {
            entities.push(gem.to_string());
        }
        let classification = Classification {
            intent: Intent::Framework,
            scope: Scope::Focused,
            target_type: TargetType::Framework,
            framework_context: true,
            entities,
            confidences: BTreeMap::new(),
        };
        let query = match gem {
            Some(gem) => format!("{concept} {gem}"),
            None => concept.to_string(),
        };
        let execution = self.executor.execute(&query, &classification, DEFAULT_STRATEGY_LIMIT).await?;
        let merged = merge_and_dedup(&execution.outputs);
        let ranked = self.ranker.rank(merged, &execution.outputs, &classification).await?;
        let mut result = self.assembler.assemble(ranked, budget, execution.trace).await?;
        result.classification = Some(classification);
        result.strategy = Some(execution.strategy);
        Ok(result)
    }

    pub async fn dependencies(&self, identifier: &str, depth: usize, budget: Option<u32>) -> Result<RetrievalResult> {
        let ids = self.graph.traverse_forward(identifier, depth.max(1));
        self.assemble_ids(ids, budget).await
    }

    pub async fn dependents(&self, identifier: &str, depth: usize, budget: Option<u32>) -> Result<RetrievalResult> {
        let ids = self.graph.traverse_reverse(identifier, depth.max(1));
        self.assemble_ids(ids, budget).await
    }

    /// Structural overview: node/edge counts plus top hubs by PageRank.
    pub async fn structure(&self, detail_full: bool, budget: Option<u32>) -> Result<RetrievalResult> {
        let report = self.graph.analyze(20, 10_000);
        let pagerank = self.graph.pagerank();
        let top = pagerank.top(if detail_full { 50 } else { 10 });

        let mut trace = Trace::default();
        trace.notes.push(format!(
            "nodes={} edges={} orphans={} dead_ends={} cycles={} bridges={}",
            self.graph.node_count(),
            self.graph.edge_count(),
            report.orphans.len(),
            report.dead_ends.len(),
            report.cycles.len(),
            report.bridges.len(),
        ));

        let ids: Vec<String> = top.into_iter().map(|(id, _)| id).collect();
        self.assemble_ids_with_trace(ids, budget, trace).await
    }

    pub async fn recent_changes(&self, limit: usize, budget: Option<u32>) -> Result<RetrievalResult> {
        let ids = self.unit_store.list_ids().await?;
        let mut scored: Vec<(String, f64)> = Vec::with_capacity(ids.len());
        for id in ids {
            let recency = self
                .metadata_store
                .find(&id)
                .await?
                .map(|m| m.git.change_frequency.recency_score())
                .unwrap_or(0.0);
            scored.push((id, recency));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        let ids: Vec<String> = scored.into_iter().map(|(id, _)| id).collect();
        self.assemble_ids(ids, budget).await
    }

    async fn assemble_ids(&self, ids: Vec<String>, budget: Option<u32>) -> Result<RetrievalResult> {
        self.assemble_ids_with_trace(ids, budget, Trace::default()).await
    }

    async fn assemble_ids_with_trace(&self, ids: Vec<String>, budget: Option<u32>, trace: Trace) -> Result<RetrievalResult> {
        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(unit) = self.unit_store.get(&id).await? {
                candidates.push(RankedCandidate {
                    candidate: Candidate {
                        identifier: unit.identifier,
                        score: 1.0,
                        sources: vec![CandidateSource::Direct],
                        metadata: unit.metadata,
                        unit_type: unit.unit_type,
                        file_path: unit.file_path,
                        matched_fields: vec![],
                        expanded_from: None,
                    },
                    final_score: 1.0,
                });
            }
        }
        self.assembler.assemble(candidates, budget, trace).await
    }
}
