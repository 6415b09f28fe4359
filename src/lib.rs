//! # Codebase Retrieval Engine
//!
//! A hybrid search, context-assembly, and pipeline-operator engine for a
//! codebase-aware knowledge service: it turns a tree of extracted units
//! (models, controllers, services, ...) into a dependency graph and a
//! searchable embedding index, and answers natural-language and
//! identifier-addressed queries with token-budgeted, attributed context.
//!
//! - [`domain`] — error taxonomy, port traits, and core data types.
//! - [`graph`] — the bidirectional dependency graph, PageRank, structural
//!   analysis.
//! - [`chunking`] — splitting a unit into embeddable, retrievable chunks.
//! - [`query`] — heuristic query classification.
//! - [`resilience`] — circuit breakers, retry, health checks.
//! - [`search`] — strategy dispatch, merge/dedup, and ranking.
//! - [`context`] — token-budgeted context assembly and output formatting.
//! - [`retriever`] — the `Retriever` facade tying search/rank/assemble
//!   together.
//! - [`indexing`] — the `Indexer`, checkpointing, importance scoring.
//! - [`operator`] — pipeline lock/cooldown, status, validation, repair.
//! - [`feedback`] — feedback capture and gap detection.
//! - [`adapters`] — concrete `UnitStore`/`VectorStore`/`MetadataStore`/
//!   `GraphStore`/`EmbeddingProvider` implementations.
//! - [`config`] — the immutable, layered `EngineConfig`.

pub mod adapters;
pub mod chunking;
pub mod config;
pub mod context;
pub mod domain;
pub mod feedback;
pub mod graph;
pub mod indexing;
pub mod operator;
pub mod query;
pub mod resilience;
pub mod retriever;
pub mod search;

pub use domain::{Error, Result};

use std::sync::Arc;
use std::time::Duration;

use adapters::{DeterministicEmbeddingProvider, FileGraphStore, FsUnitStore, InMemoryMetadataStore, InMemoryVectorStore};
use config::EngineConfig;
use context::{ContextAssembler, Format};
use domain::ports::embedding::EmbeddingProvider;
use domain::ports::graph_store::GraphStore;
use domain::ports::metadata_store::MetadataStore;
use domain::ports::unit_store::UnitStore;
use domain::ports::vector_store::VectorStore;
use feedback::FeedbackStore;
use graph::DependencyGraph;
use indexing::Indexer;
use operator::{IndexValidator, PipelineGuard, PipelineLock, Repair, StatusReporter};
use resilience::{CircuitBreaker, HealthProbe};
use retriever::Retriever;
use search::{Ranker, SearchExecutor};

/// Everything a `retrieval-enginectl` invocation needs, wired once from an
/// [`EngineConfig`] and shared thereafter. The default wiring uses the
/// filesystem-backed `UnitStore`/`GraphStore` adapters and the in-memory
/// `VectorStore`/`MetadataStore` stand-ins; swap [`Engine::with_ports`] in
/// when a real vector database or embedding provider is available.
pub struct Engine {
    pub config: EngineConfig,
    pub unit_store: Arc<dyn UnitStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub graph_store: Arc<dyn GraphStore>,
    pub graph: DependencyGraph,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub retriever: Retriever,
    pub indexer: Arc<Indexer>,
    pub feedback: FeedbackStore,
}

impl Engine {
    /// Bootstrap with the default filesystem/in-memory adapter set.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self> {
        let output_dir = std::path::PathBuf::from(&config.output_dir);
        let unit_store: Arc<dyn UnitStore> = Arc::new(FsUnitStore::open(&output_dir).await?);
        let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let metadata_store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let graph_file_store = FileGraphStore::open(output_dir.join("dependency_graph.json")).await?;
        let graph = graph_file_store.graph();
        let graph_store: Arc<dyn GraphStore> = Arc::new(graph_file_store);
        let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::new(DeterministicEmbeddingProvider::new());

        Self::with_ports(config, unit_store, vector_store, metadata_store, graph_store, graph, embedding_provider).await
    }

    /// Bootstrap with caller-supplied ports, e.g. a real vector database or
    /// AI embedding provider.
    #[allow(clippy::too_many_arguments)]
    pub async fn with_ports(
        config: EngineConfig,
        unit_store: Arc<dyn UnitStore>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        graph_store: Arc<dyn GraphStore>,
        graph: DependencyGraph,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let output_dir = std::path::PathBuf::from(&config.output_dir);

        let reset_timeout = Duration::from_secs(config.resilience.reset_timeout_secs);
        let vector_breaker = Arc::new(CircuitBreaker::new("vector_store", config.resilience.failure_threshold, reset_timeout));
        let keyword_breaker = Arc::new(CircuitBreaker::new("metadata_store", config.resilience.failure_threshold, reset_timeout));
        let graph_breaker = Arc::new(CircuitBreaker::new("graph_store", config.resilience.failure_threshold, reset_timeout));

        let executor = SearchExecutor::new(
            unit_store.clone(),
            vector_store.clone(),
            metadata_store.clone(),
            graph.clone(),
            embedding_provider.clone(),
            vector_breaker,
            keyword_breaker,
            graph_breaker,
        );
        let ranker = Ranker::new(metadata_store.clone(), config.ranker_weights);
        let assembler = ContextAssembler::new(unit_store.clone(), Format::Markdown);
        let retriever = Retriever::new(unit_store.clone(), metadata_store.clone(), graph.clone(), executor, ranker, assembler);

        let indexer = Arc::new(
            Indexer::new(
                unit_store.clone(),
                vector_store.clone(),
                metadata_store.clone(),
                graph_store.clone(),
                graph.clone(),
                embedding_provider.clone(),
                output_dir.join(".checkpoint.json"),
            )
            .await?,
        );

        let feedback = FeedbackStore::new(output_dir.join("feedback"));

        Ok(Self {
            config,
            unit_store,
            vector_store,
            metadata_store,
            graph_store,
            graph,
            embedding_provider,
            retriever,
            indexer,
            feedback,
        })
    }

    pub fn pipeline_lock(&self) -> PipelineLock {
        PipelineLock::new(self.output_dir().join(".pipeline.lock"))
            .with_stale_threshold(Duration::from_secs(self.config.operator.lock_stale_threshold_secs))
    }

    pub fn pipeline_guard(&self) -> PipelineGuard {
        PipelineGuard::new(self.output_dir().join(".pipeline_guard.json"))
            .with_cooldown(Duration::from_secs(self.config.operator.full_run_cooldown_secs))
    }

    pub fn index_validator(&self) -> IndexValidator {
        IndexValidator::new(self.output_dir())
    }

    pub fn status_reporter(&self, probes: Vec<Box<dyn HealthProbe>>) -> StatusReporter {
        StatusReporter::new(self.unit_store.clone(), self.output_dir().join("manifest.json"), probes)
    }

    pub fn repair(&self, agent: impl Into<String>) -> Repair {
        Repair::new(self.indexer.clone(), self.vector_store.clone(), self.pipeline_lock(), agent)
    }

    fn output_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.config.output_dir)
    }
}
