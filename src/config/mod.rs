//! Layered configuration: TOML file plus `ENGINE_`-prefixed environment
//! overrides, built once at startup into an immutable record threaded
//! through every component (spec.md §9, SPEC_FULL §4.12).

use crate::domain::error::{Error, Result};
use crate::search::RankerWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub token_budget_default: u32,
    pub strategy_limit: usize,
    pub deadline_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            token_budget_default: crate::context::DEFAULT_TOKEN_BUDGET,
            strategy_limit: 20,
            deadline_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub pagerank_damping: f64,
    pub pagerank_iterations: u32,
    pub hub_limit: usize,
    pub bridge_sample_threshold: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            pagerank_damping: 0.85,
            pagerank_iterations: 20,
            hub_limit: 20,
            bridge_sample_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub lock_stale_threshold_secs: u64,
    pub full_run_cooldown_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            lock_stale_threshold_secs: 3600,
            full_run_cooldown_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub retry_max_attempts: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            retry_max_attempts: 4,
        }
    }
}

/// Immutable, process-wide configuration record. Constructed once at
/// startup via [`EngineConfig::load`] and shared by `Arc` thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub output_dir: String,
    pub log_level: String,
    pub retrieval: RetrievalConfig,
    pub graph: GraphConfig,
    pub operator: OperatorConfig,
    pub resilience: ResilienceConfig,
    pub ranker_weights: RankerWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: "tmp/codebase_index".to_string(),
            log_level: "info".to_string(),
            retrieval: RetrievalConfig::default(),
            graph: GraphConfig::default(),
            operator: OperatorConfig::default(),
            resilience: ResilienceConfig::default(),
            ranker_weights: RankerWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, then apply `ENGINE_`-prefixed
    /// environment overrides (e.g. `ENGINE_OUTPUT_DIR`,
    /// `ENGINE_RETRIEVAL__DEADLINE_MS`), finally the two bare
    /// environment variables spec.md §6.3 names directly
    /// (`OUTPUT_DIR`, `DEADLINE_MS`, `LOG_LEVEL`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build().map_err(|e| Error::validation(format!("config error: {e}")))?;
        let mut cfg: EngineConfig = built
            .try_deserialize()
            .map_err(|e| Error::validation(format!("config error: {e}")))?;

        if let Ok(output_dir) = std::env::var("OUTPUT_DIR") {
            cfg.output_dir = output_dir;
        }
        if let Ok(deadline_ms) = std::env::var("DEADLINE_MS") {
            if let Ok(parsed) = deadline_ms.parse() {
                cfg.retrieval.deadline_ms = parsed;
            }
        }
        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            cfg.log_level = log_level;
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.graph.pagerank_damping, 0.85);
        assert_eq!(cfg.graph.pagerank_iterations, 20);
        assert_eq!(cfg.operator.full_run_cooldown_secs, 300);
        assert_eq!(cfg.operator.lock_stale_threshold_secs, 3600);
    }

    #[test]
    fn load_with_no_file_and_no_env_yields_defaults() {
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.output_dir, "tmp/codebase_index");
    }

    #[test]
    #[serial_test::serial]
    fn bare_output_dir_env_var_overrides() {
        std::env::set_var("OUTPUT_DIR", "/tmp/custom_index_for_test");
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.output_dir, "/tmp/custom_index_for_test");
        std::env::remove_var("OUTPUT_DIR");
    }
}
