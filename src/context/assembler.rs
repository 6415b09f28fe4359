//! Token-budgeted layered context assembly (spec.md §4.6): structural,
//! primary, supporting, and framework layers, each truncated explicitly
//! rather than silently clipped.

use crate::chunking::{Chunker, TextPreparer};
use crate::domain::error::Result;
use crate::domain::ports::unit_store::UnitStore;
use crate::domain::types::{estimate_tokens, AttributedSource, CandidateSource, ChunkRecord, RetrievalResult, Trace, UnitType, TOKEN_DIVISOR};
use crate::search::RankedCandidate;
use std::sync::Arc;

use super::format::Format;

/// Default overall token budget when a caller doesn't override it.
pub const DEFAULT_TOKEN_BUDGET: u32 = 8000;
/// Minimum remaining layer budget (in tokens) below which a candidate is
/// dropped entirely rather than included as a near-empty truncated stub.
const MIN_TRUNCATION_TOKENS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Structural,
    Primary,
    Supporting,
    Framework,
}

fn layer_of(candidate: &RankedCandidate) -> Layer {
    if candidate.candidate.unit_type == UnitType::Framework {
        return Layer::Framework;
    }
    let only_graph_expansion = candidate.candidate.sources == vec![CandidateSource::GraphExpansion];
    if only_graph_expansion {
        Layer::Supporting
    } else {
        Layer::Primary
    }
}

pub struct ContextAssembler {
    unit_store: Arc<dyn UnitStore>,
    format: Format,
}

impl ContextAssembler {
    pub fn new(unit_store: Arc<dyn UnitStore>, format: Format) -> Self {
        Self { unit_store, format }
    }

    /// Assemble `candidates` into a token-budgeted [`RetrievalResult`].
    /// `budget` is the per-call override when `Some`, else
    /// [`DEFAULT_TOKEN_BUDGET`] — always honored, never silently replaced.
    pub async fn assemble(&self, candidates: Vec<RankedCandidate>, budget: Option<u32>, mut trace: Trace) -> Result<RetrievalResult> {
        let budget = budget.unwrap_or(DEFAULT_TOKEN_BUDGET);

        let mut primary: Vec<RankedCandidate> = Vec::new();
        let mut supporting: Vec<RankedCandidate> = Vec::new();
        let mut framework: Vec<RankedCandidate> = Vec::new();
        for c in candidates {
            match layer_of(&c) {
                Layer::Primary => primary.push(c),
                Layer::Supporting => supporting.push(c),
                Layer::Framework => framework.push(c),
                Layer::Structural => {}
            }
        }

        let total_units = primary.len() + supporting.len() + framework.len();
        let overhead_total = self.format.overhead_tokens() as u64 * total_units as u64;
        let structural_budget = (budget as u64 * 10 / 100) as u32;

        let remainder = (budget as u64)
            .saturating_sub(overhead_total)
            .saturating_sub(structural_budget as u64) as u32;

        let framework_needed = !framework.is_empty();
        let (primary_pct, supporting_pct, framework_pct) = if framework_needed {
            (55, 25, 20)
        } else {
            (65, 35, 0)
        };
        let primary_budget = remainder * primary_pct / 100;
        let supporting_budget = remainder * supporting_pct / 100;
        let framework_budget = remainder * framework_pct / 100;

        let mut context = String::new();
        let mut attributed = Vec::new();
        let mut tokens_used: u32 = 0;

        let (text, used, attrs) = self.render_layer(&primary, primary_budget).await?;
        context.push_str(&text);
        tokens_used += used;
        attributed.extend(attrs);

        let (text, used, attrs) = self.render_layer(&supporting, supporting_budget).await?;
        context.push_str(&text);
        tokens_used += used;
        attributed.extend(attrs);

        let (text, used, attrs) = self.render_layer(&framework, framework_budget).await?;
        context.push_str(&text);
        tokens_used += used;
        attributed.extend(attrs);

        let structural_text = self.render_structural(&primary, structural_budget);
        tokens_used += estimate_tokens(&structural_text);
        context.push_str(&structural_text);

        trace.notes.push(format!(
            "layers: primary={} supporting={} framework={} budget={budget}",
            primary.len(),
            supporting.len(),
            framework.len()
        ));

        Ok(RetrievalResult {
            context,
            tokens_used,
            token_budget: budget,
            attributed_sources: attributed,
            classification: None,
            strategy: None,
            trace,
        })
    }

    async fn render_layer(&self, layer: &[RankedCandidate], mut layer_budget: u32) -> Result<(String, u32, Vec<AttributedSource>)> {
        let mut text = String::new();
        let mut used = 0u32;
        let mut attrs = Vec::new();

        for ranked in layer {
            if layer_budget == 0 {
                break;
            }
            let candidate = &ranked.candidate;
            let Some(unit) = self.unit_store.get(&candidate.identifier).await? else {
                continue;
            };
            let chunk = ChunkRecord::new(
                format!("{}::whole#0", unit.identifier),
                crate::domain::types::ChunkKind::Whole,
                normalize_body(unit.source_code.as_deref().unwrap_or_default()),
            );

            let full_estimate = estimate_tokens(&chunk.content) + self.format.overhead_tokens();
            let (body_text, truncated) = if full_estimate <= layer_budget {
                (chunk.content.clone(), false)
            } else if layer_budget >= MIN_TRUNCATION_TOKENS {
                let char_ceiling = TextPreparer::char_ceiling_for_tokens(layer_budget.saturating_sub(self.format.overhead_tokens()));
                let prepared = TextPreparer::prepare(&unit, &chunk, char_ceiling);
                (prepared.text, true)
            } else {
                break;
            };

            let body_with_marker = if truncated {
                format!(
                    "{body_text}\n[... truncated: full length {} chars ...]",
                    chunk.content.len()
                )
            } else {
                body_text
            };

            let wrapped = self.format.wrap_unit(
                &unit.identifier,
                unit.unit_type.as_str(),
                candidate.score,
                &format!("{:?}", unit.metadata.git.change_frequency).to_lowercase(),
                &body_with_marker,
            );
            let wrapped_tokens = estimate_tokens(&wrapped);
            if wrapped_tokens > layer_budget && !truncated {
                break;
            }

            layer_budget = layer_budget.saturating_sub(wrapped_tokens);
            used += wrapped_tokens;
            text.push_str(&wrapped);
            attrs.push(AttributedSource {
                identifier: unit.identifier,
                unit_type: unit.unit_type,
                file_path: unit.file_path,
                score: candidate.score,
                truncated,
            });
        }
        Ok((text, used, attrs))
    }

    /// Compact dependency trailer in arrow notation, e.g.
    /// `CheckoutService -> Order, PaymentGateway`.
    fn render_structural(&self, primary: &[RankedCandidate], budget: u32) -> String {
        let mut lines = Vec::new();
        for ranked in primary {
            let deps = ranked.candidate.metadata.associations.clone();
            if deps.is_empty() {
                continue;
            }
            lines.push(format!("{} -> {}", ranked.candidate.identifier, deps.join(", ")));
        }
        let trailer = self.format.wrap_dependencies_trailer(&lines);
        if estimate_tokens(&trailer) > budget && budget > 0 {
            let ceiling = (budget as f64 * TOKEN_DIVISOR) as usize;
            crate::chunking::truncate_middle(&trailer, ceiling)
        } else {
            trailer
        }
    }
}

/// Normalize line endings and strip trailing per-line whitespace; leading
/// indentation (meaningful in most source languages) is preserved.
fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{CandidateSource, ExtractedUnit, UnitMetadata};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeUnitStore(Mutex<BTreeMap<String, ExtractedUnit>>);

    impl FakeUnitStore {
        fn new(units: Vec<ExtractedUnit>) -> Self {
            Self(Mutex::new(units.into_iter().map(|u| (u.identifier.clone(), u)).collect()))
        }
    }

    #[async_trait]
    impl UnitStore for FakeUnitStore {
        async fn get(&self, identifier: &str) -> Result<Option<ExtractedUnit>> {
            Ok(self.0.lock().unwrap().get(identifier).cloned())
        }
        async fn list_ids(&self) -> Result<Vec<String>> {
            Ok(self.0.lock().unwrap().keys().cloned().collect())
        }
        async fn list_by_type(&self, _unit_type: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn unit(identifier: &str, body_len: usize) -> ExtractedUnit {
        ExtractedUnit {
            identifier: identifier.to_string(),
            unit_type: UnitType::Service,
            file_path: format!("app/services/{identifier}.rb"),
            namespace: String::new(),
            source_code: Some("x".repeat(body_len)),
            metadata: UnitMetadata::default(),
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: "deadbeef".to_string(),
            estimated_tokens: (body_len / 4) as u32,
        }
    }

    fn candidate(identifier: &str) -> RankedCandidate {
        RankedCandidate {
            candidate: Candidate {
                identifier: identifier.to_string(),
                score: 1.0,
                sources: vec![CandidateSource::Direct],
                metadata: UnitMetadata::default(),
                unit_type: UnitType::Service,
                file_path: format!("app/services/{identifier}.rb"),
                matched_fields: vec![],
                expanded_from: None,
            },
            final_score: 1.0,
        }
    }

    #[tokio::test]
    async fn tokens_used_never_exceeds_budget_by_more_than_five_percent() {
        let store: Arc<dyn UnitStore> = Arc::new(FakeUnitStore::new(vec![unit("Big", 40_000)]));
        let assembler = ContextAssembler::new(store, Format::Markdown);
        let budget = 500;
        let result = assembler.assemble(vec![candidate("Big")], Some(budget), Trace::default()).await.unwrap();
        assert!(
            result.tokens_used as f64 <= budget as f64 * 1.05,
            "tokens_used={} budget={budget}",
            result.tokens_used
        );
    }

    #[tokio::test]
    async fn truncated_sources_are_marked_and_carry_a_marker_in_context() {
        let store: Arc<dyn UnitStore> = Arc::new(FakeUnitStore::new(vec![unit("Huge", 100_000)]));
        let assembler = ContextAssembler::new(store, Format::Markdown);
        let result = assembler.assemble(vec![candidate("Huge")], Some(600), Trace::default()).await.unwrap();
        let huge = result.attributed_sources.iter().find(|s| s.identifier == "Huge").expect("Huge included");
        assert!(huge.truncated);
        assert!(result.context.contains("truncated"));
    }

    #[tokio::test]
    async fn small_units_fit_within_budget_untruncated() {
        let store: Arc<dyn UnitStore> = Arc::new(FakeUnitStore::new(vec![unit("Small", 50)]));
        let assembler = ContextAssembler::new(store, Format::Markdown);
        let result = assembler.assemble(vec![candidate("Small")], Some(DEFAULT_TOKEN_BUDGET), Trace::default()).await.unwrap();
        let small = result.attributed_sources.iter().find(|s| s.identifier == "Small").expect("Small included");
        assert!(!small.truncated);
    }
}
