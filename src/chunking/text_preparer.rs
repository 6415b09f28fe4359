//! Renders a [`ChunkRecord`] into the header-prefixed text that gets
//! embedded and the text shown in assembled context (spec.md §4.1).

use crate::domain::types::{estimate_tokens, ChunkKind, ChunkRecord, ExtractedUnit, TOKEN_DIVISOR};

use super::chunker::truncate_middle;

/// Embedding-ready (and context-display) text for one chunk, plus its
/// estimated token count under [`TOKEN_DIVISOR`].
#[derive(Debug, Clone)]
pub struct PreparedText {
    pub text: String,
    pub token_estimate: u32,
    pub truncated: bool,
}

pub struct TextPreparer;

impl TextPreparer {
    /// Build the header-prefixed text for `chunk`, enforcing
    /// `provider_char_ceiling` by truncating the body only — the header is
    /// never truncated. Malformed/missing optional metadata degrades to a
    /// header without those fields rather than failing.
    pub fn prepare(unit: &ExtractedUnit, chunk: &ChunkRecord, provider_char_ceiling: usize) -> PreparedText {
        let header = Self::header(unit, chunk);
        let header_len = header.len();
        let body_ceiling = provider_char_ceiling.saturating_sub(header_len);

        let (body, truncated) = if body_ceiling > 0 && chunk.content.len() > body_ceiling {
            (truncate_middle(&chunk.content, body_ceiling), true)
        } else if body_ceiling == 0 {
            (String::new(), !chunk.content.is_empty())
        } else {
            (chunk.content.clone(), false)
        };

        let text = format!("{header}{body}");
        PreparedText {
            token_estimate: estimate_tokens(&text),
            text,
            truncated,
        }
    }

    fn header(unit: &ExtractedUnit, chunk: &ChunkRecord) -> String {
        let deps = unit.top_dependencies(3);
        let deps_display = if deps.is_empty() {
            "none".to_string()
        } else {
            deps.join(", ")
        };

        let mut header = format!(
            "# Unit: {} ({})\n# File: {}\n# Section: {:?}\n# Dependencies: {}\n",
            unit.identifier,
            unit.unit_type,
            unit.file_path,
            chunk.chunk_kind,
            deps_display,
        );

        if matches!(chunk.chunk_kind, ChunkKind::Whole | ChunkKind::Summary) {
            header.push_str(&format!(
                "# Columns: {}\n# Associations: {}\n# Dependents: {}\n# Change-Frequency: {:?}\n",
                if unit.metadata.column_names.is_empty() {
                    "none".to_string()
                } else {
                    unit.metadata.column_names.join(", ")
                },
                unit.metadata.associations.len(),
                unit.dependents.len(),
                unit.metadata.git.change_frequency,
            ));
        }
        header
    }

    /// Character ceiling implied by a provider's token limit under the
    /// canonical [`TOKEN_DIVISOR`].
    pub fn char_ceiling_for_tokens(max_tokens: u32) -> usize {
        (max_tokens as f64 * TOKEN_DIVISOR) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkKind, UnitMetadata, UnitType};

    fn unit() -> ExtractedUnit {
        ExtractedUnit {
            identifier: "Order".into(),
            unit_type: UnitType::Model,
            file_path: "app/models/order.rb".into(),
            namespace: "".into(),
            source_code: Some("class Order; end".into()),
            metadata: UnitMetadata::default(),
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: "deadbeef".into(),
            estimated_tokens: 0,
        }
    }

    #[test]
    fn header_never_truncates_even_under_tight_ceiling() {
        let u = unit();
        let chunk = ChunkRecord::new("c1", ChunkKind::Whole, "x".repeat(500));
        let prepared = TextPreparer::prepare(&u, &chunk, 50);
        assert!(prepared.text.starts_with("# Unit: Order"));
        assert!(prepared.truncated);
    }

    #[test]
    fn body_preserved_when_under_ceiling() {
        let u = unit();
        let chunk = ChunkRecord::new("c1", ChunkKind::Whole, "class Order; end".into());
        let prepared = TextPreparer::prepare(&u, &chunk, 10_000);
        assert!(!prepared.truncated);
        assert!(prepared.text.contains("class Order; end"));
    }

    #[test]
    fn char_ceiling_scales_with_token_divisor() {
        assert_eq!(TextPreparer::char_ceiling_for_tokens(100), 400);
    }
}
