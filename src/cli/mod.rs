//! `retrieval-enginectl`: exposes the operator tool surface from spec.md
//! §6.3 as `clap` subcommands, printing the uniform `{ok, result, error,
//! error_type}` envelope and mapping error kinds to the documented exit
//! codes.

use clap::{Parser, Subcommand, ValueEnum};
use retrieval_engine::domain::error::Error;
use retrieval_engine::feedback::{FeedbackEntry, GapDetector, Rating};
use retrieval_engine::operator::FullRunKind;
use retrieval_engine::resilience::HealthProbe;
use retrieval_engine::Engine;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "retrieval-enginectl", about = "Codebase-aware knowledge service operator CLI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file; falls back to defaults plus env overrides.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DetailLevel {
    Summary,
    Full,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RunMode {
    Full,
    Incremental,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RatingArg {
    Helpful,
    Partial,
    Unhelpful,
    Wrong,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RepairIssue {
    StaleUnits,
    MissingEmbeddings,
    OrphanedVectors,
    CountMismatch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GraphAnalysisKind {
    Orphans,
    DeadEnds,
    Hubs,
    Cycles,
    Bridges,
    All,
}

#[derive(Subcommand)]
pub enum Command {
    Retrieve {
        query: String,
        #[arg(long)]
        budget: Option<u32>,
    },
    Lookup {
        identifier: String,
        #[arg(long)]
        budget: Option<u32>,
    },
    Dependencies {
        identifier: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
        #[arg(long)]
        budget: Option<u32>,
    },
    Dependents {
        identifier: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
        #[arg(long)]
        budget: Option<u32>,
    },
    Search {
        keywords: Vec<String>,
        #[arg(long)]
        fields: Vec<String>,
        /// `key=value` pairs, drawn from the keyword-field filter set.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        budget: Option<u32>,
    },
    Framework {
        concept: String,
        #[arg(long)]
        gem: Option<String>,
        #[arg(long)]
        budget: Option<u32>,
    },
    Structure {
        #[arg(long, value_enum, default_value_t = DetailLevel::Summary)]
        detail: DetailLevel,
        #[arg(long)]
        budget: Option<u32>,
    },
    RecentChanges {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        budget: Option<u32>,
    },
    GraphAnalysis {
        #[arg(long, value_enum, default_value_t = GraphAnalysisKind::All)]
        analysis: GraphAnalysisKind,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Pagerank {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    Extract {
        #[arg(value_enum)]
        mode: RunMode,
        #[arg(long)]
        dry_run: bool,
    },
    Embed {
        #[arg(value_enum)]
        mode: RunMode,
        identifiers: Vec<String>,
    },
    Status,
    Diagnose {
        #[arg(long)]
        deep: bool,
    },
    Repair {
        #[arg(value_enum)]
        issue: RepairIssue,
        identifiers: Vec<String>,
    },
    RateRetrieval {
        query: String,
        #[arg(value_enum)]
        rating: RatingArg,
        #[arg(long)]
        missing: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    ReportGap {
        description: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        expected_type: Option<String>,
        #[arg(long)]
        expected_identifier: Option<String>,
    },
    Explain {
        query: String,
        #[arg(long)]
        budget: Option<u32>,
    },
    SuggestImprovements,
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<String>,
}

/// Exit codes per spec.md §6.3: 0 success, 1 validation, 2 not found,
/// 3 pipeline locked, 4 cooldown, 5 degraded backend, 6 internal error.
fn exit_code_for(kind: &str) -> i32 {
    match kind {
        "validation" => 1,
        "not_found" => 2,
        "lock_contention" => 3,
        "cooldown" => 4,
        "degraded" | "circuit_open" => 5,
        _ => 6,
    }
}

fn print_ok<T: Serialize>(result: T) {
    let envelope = Envelope {
        ok: true,
        result: Some(result),
        error: None,
        error_type: None,
    };
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
}

fn print_err_and_exit(err: Error) -> ! {
    let kind = err.kind().to_string();
    let envelope: Envelope<()> = Envelope {
        ok: false,
        result: None,
        error: Some(err.to_string()),
        error_type: Some(kind.clone()),
    };
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    std::process::exit(exit_code_for(&kind));
}

fn parse_filters(raw: &[String]) -> BTreeMap<String, Value> {
    raw.iter()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

pub async fn run(cli: Cli) {
    let config = match retrieval_engine::config::EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => print_err_and_exit(e),
    };
    let engine = match Engine::bootstrap(config).await {
        Ok(e) => e,
        Err(e) => print_err_and_exit(e),
    };

    let outcome = dispatch(&engine, cli.command).await;
    match outcome {
        Ok(()) => {}
        Err(e) => print_err_and_exit(e),
    }
}

async fn dispatch(engine: &Engine, command: Command) -> Result<(), Error> {
    match command {
        Command::Retrieve { query, budget } => {
            let result = engine.retriever.retrieve(&query, budget).await?;
            print_ok(result);
        }
        Command::Lookup { identifier, budget } => {
            let result = engine.retriever.lookup(&identifier, budget).await?;
            print_ok(result);
        }
        Command::Dependencies { identifier, depth, budget } => {
            let result = engine.retriever.dependencies(&identifier, depth, budget).await?;
            print_ok(result);
        }
        Command::Dependents { identifier, depth, budget } => {
            let result = engine.retriever.dependents(&identifier, depth, budget).await?;
            print_ok(result);
        }
        Command::Search { keywords, fields, filters, budget } => {
            let filters = parse_filters(&filters);
            let result = engine.retriever.search(&keywords, &fields, &filters, budget).await?;
            print_ok(result);
        }
        Command::Framework { concept, gem, budget } => {
            let result = engine.retriever.framework(&concept, gem.as_deref(), budget).await?;
            print_ok(result);
        }
        Command::Structure { detail, budget } => {
            let full = matches!(detail, DetailLevel::Full);
            let result = engine.retriever.structure(full, budget).await?;
            print_ok(result);
        }
        Command::RecentChanges { limit, budget } => {
            let result = engine.retriever.recent_changes(limit, budget).await?;
            print_ok(result);
        }
        Command::GraphAnalysis { limit, .. } => {
            let report = engine.graph.analyze(limit, 10_000);
            print_ok(report);
        }
        Command::Pagerank { limit } => {
            let scores = engine.graph.pagerank();
            print_ok(scores.top(limit));
        }
        Command::Extract { .. } => {
            return Err(Error::validation(
                "extraction is performed by the upstream extractor; this engine only consumes its output",
            ));
        }
        Command::Embed { mode, identifiers } => {
            let lock = engine.pipeline_lock();
            let guard = lock.acquire("cli", "embed").await?;
            let report = match mode {
                RunMode::Full => {
                    engine.pipeline_guard().check_and_record(FullRunKind::Embed).await?;
                    engine.indexer.index_all().await
                }
                RunMode::Incremental => engine.indexer.index_incremental(&identifiers).await,
            };
            guard.release().await;
            print_ok(report?);
        }
        Command::Status => {
            let probes: Vec<Box<dyn HealthProbe>> = Vec::new();
            let report = engine.status_reporter(probes).report(None, 0, false).await?;
            print_ok(report);
        }
        Command::Diagnose { deep } => {
            let probes: Vec<Box<dyn HealthProbe>> = Vec::new();
            let health = retrieval_engine::resilience::run_health_checks(&probes, deep).await;
            let checkpoint = retrieval_engine::indexing::Checkpoint::load(
                &std::path::PathBuf::from(&engine.config.output_dir).join(".checkpoint.json"),
            )
            .await?;
            let validation = engine.index_validator().validate(&checkpoint).await?;
            print_ok(serde_json::json!({ "health": health, "validation": validation }));
        }
        Command::Repair { issue, identifiers } => {
            let repair = engine.repair("cli");
            match issue {
                RepairIssue::StaleUnits => {
                    let count = repair.stale_units(&identifiers).await?;
                    print_ok(serde_json::json!({ "forgotten": count }));
                }
                RepairIssue::MissingEmbeddings => {
                    print_ok(repair.missing_embeddings(&identifiers).await?);
                }
                RepairIssue::OrphanedVectors => {
                    let count = repair.orphaned_vectors(&identifiers).await?;
                    print_ok(serde_json::json!({ "deleted": count }));
                }
                RepairIssue::CountMismatch => {
                    print_ok(repair.count_mismatch(&identifiers).await?);
                }
            }
        }
        Command::RateRetrieval { query, rating, missing, notes } => {
            let rating = match rating {
                RatingArg::Helpful => Rating::Helpful,
                RatingArg::Partial => Rating::Partial,
                RatingArg::Unhelpful => Rating::Unhelpful,
                RatingArg::Wrong => Rating::Wrong,
            };
            engine
                .feedback
                .append(&FeedbackEntry::Rating {
                    query,
                    rating,
                    missing,
                    notes,
                    recorded_at: chrono::Utc::now(),
                })
                .await?;
            print_ok(serde_json::json!({ "recorded": true }));
        }
        Command::ReportGap {
            description,
            query,
            expected_type,
            expected_identifier,
        } => {
            engine
                .feedback
                .append(&FeedbackEntry::Gap {
                    description,
                    query,
                    expected_type,
                    expected_identifier,
                    recorded_at: chrono::Utc::now(),
                })
                .await?;
            print_ok(serde_json::json!({ "recorded": true }));
        }
        Command::Explain { query, budget } => {
            let result = engine.retriever.retrieve(&query, budget).await?;
            let top_score = result.attributed_sources.iter().map(|s| s.score).fold(0.0, f64::max);
            let truncated_units: Vec<String> = result
                .attributed_sources
                .iter()
                .filter(|s| s.truncated)
                .map(|s| s.identifier.clone())
                .collect();
            engine
                .feedback
                .append(&FeedbackEntry::RetrievalTrace {
                    query,
                    result_count: result.attributed_sources.len(),
                    top_score,
                    truncated_units,
                    recorded_at: chrono::Utc::now(),
                })
                .await?;
            print_ok(result);
        }
        Command::SuggestImprovements => {
            let entries = engine.feedback.load_window(7).await?;
            let signals = GapDetector::detect(&entries);
            print_ok(signals);
        }
    }
    Ok(())
}
