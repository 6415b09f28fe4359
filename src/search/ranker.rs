//! Reciprocal Rank Fusion plus a weighted linear combination of
//! normalized signals (spec.md §4.5). Reads unit metadata via exactly one
//! `MetadataStore` call per candidate, cached for the invocation.

use crate::domain::error::Result;
use crate::domain::ports::metadata_store::MetadataStore;
use crate::domain::types::{Candidate, Classification, TargetType, UnitMetadata, UnitType};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::executor::StrategyOutput;

/// RRF constant (spec.md §4.5).
const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RankerWeights {
    pub w_rrf: f64,
    pub w_kw: f64,
    pub w_rec: f64,
    pub w_imp: f64,
    pub w_type: f64,
    pub w_div: f64,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            w_rrf: 0.40,
            w_kw: 0.20,
            w_rec: 0.15,
            w_imp: 0.10,
            w_type: 0.10,
            w_div: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub final_score: f64,
}

pub struct Ranker {
    metadata_store: Arc<dyn MetadataStore>,
    weights: RankerWeights,
}

impl Ranker {
    pub fn new(metadata_store: Arc<dyn MetadataStore>, weights: RankerWeights) -> Self {
        Self { metadata_store, weights }
    }

    /// Rank `candidates` using `outputs`' per-strategy rank lists for RRF.
    /// Deterministic: identical inputs produce identical orderings, ties
    /// broken by identifier lexicographic order.
    pub async fn rank(&self, candidates: Vec<Candidate>, outputs: &[StrategyOutput], classification: &Classification) -> Result<Vec<RankedCandidate>> {
        let rrf_scores = compute_rrf(outputs);

        let mut metadata_cache: BTreeMap<String, Option<UnitMetadata>> = BTreeMap::new();
        for candidate in &candidates {
            let metadata = self.metadata_store.find(&candidate.identifier).await?;
            metadata_cache.insert(candidate.identifier.clone(), metadata);
        }

        let mut scored: Vec<(Candidate, f64)> = candidates
            .into_iter()
            .map(|c| {
                let base = self.base_score(&c, &rrf_scores, &metadata_cache, classification);
                (c, base)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.identifier.cmp(&b.0.identifier)));

        let mut selected_namespace_type: Vec<(String, UnitType)> = Vec::new();
        let mut ranked = Vec::with_capacity(scored.len());
        for (candidate, base) in scored {
            let namespace = metadata_cache
                .get(&candidate.identifier)
                .and_then(|m| m.as_ref())
                .map(|_| candidate.file_path.rsplit_once('/').map(|(ns, _)| ns.to_string()).unwrap_or_default())
                .unwrap_or_default();
            let penalty = diversity_penalty(&namespace, candidate.unit_type, &selected_namespace_type);
            let final_score = base - self.weights.w_div * penalty;
            selected_namespace_type.push((namespace, candidate.unit_type));
            ranked.push(RankedCandidate { candidate, final_score });
        }

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap()
                .then_with(|| a.candidate.identifier.cmp(&b.candidate.identifier))
        });
        Ok(ranked)
    }

    fn base_score(
        &self,
        candidate: &Candidate,
        rrf_scores: &BTreeMap<String, f64>,
        metadata_cache: &BTreeMap<String, Option<UnitMetadata>>,
        classification: &Classification,
    ) -> f64 {
        let rrf = rrf_scores.get(&candidate.identifier).copied().unwrap_or(0.0);
        let metadata = metadata_cache.get(&candidate.identifier).and_then(|m| m.as_ref());
        let recency = metadata.map(|m| m.git.change_frequency.recency_score()).unwrap_or(0.5);
        let importance = metadata
            .and_then(|m| m.importance)
            .map(|i| i.score())
            .unwrap_or(0.3);
        let type_match = type_match_score(classification.target_type, candidate.unit_type);
        let keyword = (0.25 * candidate.matched_fields.len() as f64).min(1.0);

        self.weights.w_rrf * rrf
            + self.weights.w_kw * keyword
            + self.weights.w_rec * recency
            + self.weights.w_imp * importance
            + self.weights.w_type * type_match
    }
}

fn type_match_score(target_type: TargetType, unit_type: UnitType) -> f64 {
    if target_type == TargetType::Unknown {
        0.5
    } else if target_type.matches(unit_type) {
        1.0
    } else {
        0.3
    }
}

/// +0.1 per already-selected candidate sharing (namespace, type), capped
/// at 0.5, applied during greedy selection order (post initial sort).
fn diversity_penalty(namespace: &str, unit_type: UnitType, already_selected: &[(String, UnitType)]) -> f64 {
    let matches = already_selected
        .iter()
        .filter(|(ns, ty)| ns == namespace && *ty == unit_type)
        .count();
    (0.1 * matches as f64).min(0.5)
}

/// RRF: `score_i(c) = sum over strategies of 1/(k + rank_i(c))`, rank
/// starting at 1 within each strategy's own candidate order.
fn compute_rrf(outputs: &[StrategyOutput]) -> BTreeMap<String, f64> {
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();
    for output in outputs {
        let mut ordered = output.candidates.clone();
        ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.identifier.cmp(&b.identifier)));
        for (idx, candidate) in ordered.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(candidate.identifier.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::Result as DomainResult;
    use crate::domain::types::{CandidateSource, Intent, Scope};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;

    struct FakeMetadataStore;

    #[async_trait]
    impl MetadataStore for FakeMetadataStore {
        async fn upsert(&self, _id: &str, _metadata: UnitMetadata) -> DomainResult<()> {
            Ok(())
        }
        async fn find(&self, _id: &str) -> DomainResult<Option<UnitMetadata>> {
            Ok(Some(UnitMetadata::default()))
        }
        async fn search_keywords(
            &self,
            _keywords: &[String],
            _fields: &[String],
            _filters: &BTreeMap<String, Value>,
            _limit: usize,
        ) -> DomainResult<Vec<crate::domain::ports::metadata_store::KeywordHit>> {
            Ok(vec![])
        }
        async fn query(&self, _filters: &BTreeMap<String, Value>, _limit: usize) -> DomainResult<Vec<String>> {
            Ok(vec![])
        }
        async fn list_by_type(&self, _unit_type: &str, _limit: usize) -> DomainResult<Vec<String>> {
            Ok(vec![])
        }
        async fn delete(&self, _id: &str) -> DomainResult<()> {
            Ok(())
        }
    }

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            identifier: id.to_string(),
            score,
            sources: vec![CandidateSource::Vector],
            metadata: UnitMetadata::default(),
            unit_type: UnitType::Model,
            file_path: format!("app/models/{id}.rb"),
            matched_fields: vec![],
            expanded_from: None,
        }
    }

    fn classification() -> Classification {
        Classification {
            intent: Intent::Understand,
            scope: Scope::Exploratory,
            target_type: TargetType::Unknown,
            framework_context: false,
            entities: vec![],
            confidences: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn deterministic_ranking_with_identifier_tie_break() {
        let ranker = Ranker::new(Arc::new(FakeMetadataStore), RankerWeights::default());
        let candidates = vec![candidate("B", 0.5), candidate("A", 0.5)];
        let outputs = vec![StrategyOutput {
            name: "vector",
            candidates: candidates.clone(),
        }];
        let ranked1 = ranker.rank(candidates.clone(), &outputs, &classification()).await.unwrap();
        let ranked2 = ranker.rank(candidates, &outputs, &classification()).await.unwrap();
        let ids1: Vec<_> = ranked1.iter().map(|r| r.candidate.identifier.clone()).collect();
        let ids2: Vec<_> = ranked2.iter().map(|r| r.candidate.identifier.clone()).collect();
        assert_eq!(ids1, ids2);
    }

    #[tokio::test]
    async fn higher_rrf_contribution_ranks_first() {
        let ranker = Ranker::new(Arc::new(FakeMetadataStore), RankerWeights::default());
        let candidates = vec![candidate("Low", 0.1), candidate("High", 0.9)];
        let outputs = vec![StrategyOutput {
            name: "vector",
            candidates: candidates.clone(),
        }];
        let ranked = ranker.rank(candidates, &outputs, &classification()).await.unwrap();
        assert_eq!(ranked[0].candidate.identifier, "High");
    }
}
