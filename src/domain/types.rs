//! Core data model shared by every component of the retrieval engine.
//!
//! These types mirror the on-disk extraction artifacts (an
//! [`ExtractedUnit`] per identifier, with its [`ChunkRecord`]s and
//! [`DependencyEdge`]s) and the in-memory records the pipeline produces
//! while answering a query ([`Candidate`], [`Classification`],
//! [`RetrievalResult`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Divisor used to estimate token counts from character length:
/// `tokens = ceil(len(content) / TOKEN_DIVISOR)`.
///
/// Resolves the open question between the extractor's historical `3.5` and
/// the benchmark-recommended `4.0`; this crate canonicalizes on `4.0`. See
/// `DESIGN.md` for the rationale. Changing this constant changes chunk
/// sizing, truncation behavior, and cost estimates gem-wide.
pub const TOKEN_DIVISOR: f64 = 4.0;

/// Estimate a token count from a string length using [`TOKEN_DIVISOR`].
pub fn estimate_tokens(content: &str) -> u32 {
    (content.len() as f64 / TOKEN_DIVISOR).ceil() as u32
}

/// Tag describing the kind of artifact an [`ExtractedUnit`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Model,
    Controller,
    Service,
    Job,
    Mailer,
    Component,
    Concern,
    Route,
    Framework,
    Chunk,
    Schema,
    GraphqlType,
    GraphqlMutation,
    GraphqlResolver,
    GraphqlQuery,
    Other,
}

impl UnitType {
    /// Parse a unit type tag as produced by the extractor's JSON artifacts.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "model" => Self::Model,
            "controller" => Self::Controller,
            "service" => Self::Service,
            "job" => Self::Job,
            "mailer" => Self::Mailer,
            "component" => Self::Component,
            "concern" => Self::Concern,
            "route" => Self::Route,
            "framework" => Self::Framework,
            "chunk" => Self::Chunk,
            "schema" => Self::Schema,
            "graphql_type" => Self::GraphqlType,
            "graphql_mutation" => Self::GraphqlMutation,
            "graphql_resolver" => Self::GraphqlResolver,
            "graphql_query" => Self::GraphqlQuery,
            _ => Self::Other,
        }
    }

    /// Lowercase tag, the inverse of [`UnitType::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Controller => "controller",
            Self::Service => "service",
            Self::Job => "job",
            Self::Mailer => "mailer",
            Self::Component => "component",
            Self::Concern => "concern",
            Self::Route => "route",
            Self::Framework => "framework",
            Self::Chunk => "chunk",
            Self::Schema => "schema",
            Self::GraphqlType => "graphql_type",
            Self::GraphqlMutation => "graphql_mutation",
            Self::GraphqlResolver => "graphql_resolver",
            Self::GraphqlQuery => "graphql_query",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Git-derived change frequency class, influencing recency ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Hot,
    Active,
    Stable,
    Dormant,
    New,
    #[default]
    Unknown,
}

impl ChangeFrequency {
    /// Recency signal in `[0, 1]` used by the ranker's weighted combination.
    pub fn recency_score(&self) -> f64 {
        match self {
            Self::Hot => 1.0,
            Self::Active => 0.8,
            Self::New => 0.7,
            Self::Stable => 0.5,
            Self::Dormant => 0.3,
            Self::Unknown => 0.5,
        }
    }
}

/// Coarse importance tag carried into vector metadata for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    /// Importance signal in `[0, 1]` used by the ranker's weighted combination.
    pub fn score(&self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.6,
            Self::Low => 0.3,
        }
    }

    /// Lowercase tag as stored in vector metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Git-derived fields attached to a unit's metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitMetadata {
    pub change_frequency: ChangeFrequency,
    pub contributors: u32,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Free-form per-unit metadata: associations, validations, callbacks,
/// route, callback side-effects, plus the [`GitMetadata`] fields. Kept as a
/// typed envelope around an open `extra` bag so unrecognized extractor
/// fields survive a round trip instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnitMetadata {
    #[serde(default)]
    pub associations: Vec<String>,
    #[serde(default)]
    pub validations: Vec<String>,
    #[serde(default)]
    pub callbacks: Vec<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub column_names: Vec<String>,
    #[serde(default)]
    pub method_names: Vec<String>,
    #[serde(default)]
    pub git: GitMetadata,
    #[serde(default)]
    pub importance: Option<Importance>,
    /// Any extraction fields not modeled explicitly above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// How one unit depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Calls,
    Includes,
    Inlined,
    Associates,
    Inherits,
    References,
    Routes,
    Other,
}

/// A single forward dependency edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub target_identifier: String,
    pub relation_kind: RelationKind,
}

/// Semantic role of a chunk within its owning unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Summary,
    Associations,
    Callbacks,
    Validations,
    Scopes,
    Action,
    FieldGroup,
    Concern,
    Whole,
    Body,
}

/// A single embeddable, retrievable sub-section of a unit.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChunkRecord {
    #[validate(length(min = 1, message = "chunk_id cannot be empty"))]
    pub chunk_id: String,
    pub chunk_kind: ChunkKind,
    pub content: String,
    /// Lowercase hex SHA-256 of `content`. Changes iff `content` changes;
    /// re-embedding is gated on this value matching the stored checkpoint.
    pub content_hash: String,
    pub token_estimate: u32,
}

impl ChunkRecord {
    /// Build a chunk record, computing `content_hash` and `token_estimate`
    /// from `content`.
    pub fn new(chunk_id: impl Into<String>, chunk_kind: ChunkKind, content: String) -> Self {
        let content_hash = sha256_hex(content.as_bytes());
        let token_estimate = estimate_tokens(&content);
        Self {
            chunk_id: chunk_id.into(),
            chunk_kind,
            content,
            content_hash,
            token_estimate,
        }
    }
}

/// Compute a lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The atomic record produced by the upstream extractor and consumed
/// read-only by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtractedUnit {
    #[validate(length(min = 1, message = "identifier cannot be empty"))]
    pub identifier: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub file_path: String,
    pub namespace: String,
    pub source_code: Option<String>,
    #[serde(default)]
    pub metadata: UnitMetadata,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    /// Reverse edges: recomputed by the graph on load, never trusted from
    /// the extractor's JSON.
    #[serde(default, skip_serializing)]
    pub dependents: Vec<String>,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
    pub source_hash: String,
    pub estimated_tokens: u32,
}

impl ExtractedUnit {
    /// Up to the first three dependency targets, for compact header display.
    pub fn top_dependencies(&self, limit: usize) -> Vec<&str> {
        self.dependencies
            .iter()
            .take(limit)
            .map(|d| d.target_identifier.as_str())
            .collect()
    }
}

/// Where a [`Candidate`] came from, and how it was surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Vector,
    Keyword,
    GraphExpansion,
    Direct,
}

/// A unit surfaced by one or more search strategies, with enough
/// provenance for the ranker and assembler to work from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier: String,
    pub score: f64,
    pub sources: Vec<CandidateSource>,
    pub metadata: UnitMetadata,
    pub unit_type: UnitType,
    pub file_path: String,
    pub matched_fields: Vec<String>,
    pub expanded_from: Option<String>,
}

impl Candidate {
    /// Union `other`'s sources into `self` and keep the maximum score,
    /// per the SearchExecutor's merge/dedup contract.
    pub fn merge(&mut self, other: Candidate) {
        self.score = self.score.max(other.score);
        for s in other.sources {
            if !self.sources.contains(&s) {
                self.sources.push(s);
            }
        }
        for f in other.matched_fields {
            if !self.matched_fields.contains(&f) {
                self.matched_fields.push(f);
            }
        }
        if self.expanded_from.is_none() {
            self.expanded_from = other.expanded_from;
        }
    }
}

/// Intent classes recognized by the query classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Understand,
    Locate,
    Trace,
    Debug,
    Implement,
    Reference,
    Compare,
    Framework,
}

/// Desired breadth of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Pinpoint,
    Focused,
    Exploratory,
    Comprehensive,
}

/// The kind of unit the query is most likely targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Model,
    Controller,
    Service,
    Job,
    Mailer,
    Component,
    Concern,
    Framework,
    Schema,
    Route,
    GraphqlType,
    GraphqlMutation,
    GraphqlResolver,
    GraphqlQuery,
    Unknown,
}

impl TargetType {
    /// Whether this target type matches the unit type of a candidate, for
    /// the ranker's `type_match` signal.
    pub fn matches(&self, unit_type: UnitType) -> bool {
        matches!(
            (self, unit_type),
            (Self::Model, UnitType::Model)
                | (Self::Controller, UnitType::Controller)
                | (Self::Service, UnitType::Service)
                | (Self::Job, UnitType::Job)
                | (Self::Mailer, UnitType::Mailer)
                | (Self::Component, UnitType::Component)
                | (Self::Concern, UnitType::Concern)
                | (Self::Framework, UnitType::Framework)
                | (Self::Schema, UnitType::Schema)
                | (Self::Route, UnitType::Route)
                | (Self::GraphqlType, UnitType::GraphqlType)
                | (Self::GraphqlMutation, UnitType::GraphqlMutation)
                | (Self::GraphqlResolver, UnitType::GraphqlResolver)
                | (Self::GraphqlQuery, UnitType::GraphqlQuery)
        )
    }
}

/// Output of the query classifier: everything downstream components need
/// to pick and execute a search strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub scope: Scope,
    pub target_type: TargetType,
    pub framework_context: bool,
    pub entities: Vec<String>,
    pub confidences: BTreeMap<String, f64>,
}

/// Tag naming which strategy answered a `retrieve` call, attached to the
/// trace for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    Framework,
    DirectThenGraph,
    DirectThenKeyword,
    GraphTraversal,
    Hybrid,
}

/// Per-candidate attribution recorded in a [`RetrievalResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributedSource {
    pub identifier: String,
    pub unit_type: UnitType,
    pub file_path: String,
    pub score: f64,
    pub truncated: bool,
}

/// Diagnostic record of classification, strategy selection, scores, and
/// budget allocation, attached to every [`RetrievalResult`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Trace {
    pub strategies_run: Vec<String>,
    pub strategies_skipped: Vec<String>,
    pub downgrade_reasons: Vec<String>,
    pub notes: Vec<String>,
}

/// The final answer to a `retrieve`/`lookup`/pass-through call: a
/// token-budgeted, attributed context bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub context: String,
    pub tokens_used: u32,
    pub token_budget: u32,
    pub attributed_sources: Vec<AttributedSource>,
    pub classification: Option<Classification>,
    pub strategy: Option<StrategyTag>,
    pub trace: Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_uses_canonical_divisor() {
        let content = "a".repeat(40);
        assert_eq!(estimate_tokens(&content), 10);
    }

    #[test]
    fn chunk_hash_changes_with_content() {
        let a = ChunkRecord::new("c1", ChunkKind::Whole, "fn a() {}".to_string());
        let b = ChunkRecord::new("c1", ChunkKind::Whole, "fn b() {}".to_string());
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn chunk_hash_stable_for_identical_content() {
        let a = ChunkRecord::new("c1", ChunkKind::Whole, "fn a() {}".to_string());
        let b = ChunkRecord::new("c1", ChunkKind::Whole, "fn a() {}".to_string());
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn candidate_merge_unions_sources_and_keeps_max_score() {
        let mut a = Candidate {
            identifier: "Order".into(),
            score: 0.4,
            sources: vec![CandidateSource::Vector],
            metadata: UnitMetadata::default(),
            unit_type: UnitType::Model,
            file_path: "app/models/order.rb".into(),
            matched_fields: vec![],
            expanded_from: None,
        };
        let b = Candidate {
            identifier: "Order".into(),
            score: 0.9,
            sources: vec![CandidateSource::Keyword],
            metadata: UnitMetadata::default(),
            unit_type: UnitType::Model,
            file_path: "app/models/order.rb".into(),
            matched_fields: vec!["identifier".into()],
            expanded_from: None,
        };
        a.merge(b);
        assert_eq!(a.score, 0.9);
        assert_eq!(a.sources.len(), 2);
        assert_eq!(a.matched_fields, vec!["identifier".to_string()]);
    }

    #[test]
    fn target_type_matches_unit_type() {
        assert!(TargetType::Model.matches(UnitType::Model));
        assert!(!TargetType::Model.matches(UnitType::Controller));
    }
}
