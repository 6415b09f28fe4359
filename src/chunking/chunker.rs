//! Splits an [`ExtractedUnit`] into [`ChunkRecord`]s tuned for embedding,
//! per the policy in spec.md §4.1 (model/controller/GraphQL-type/default).

use crate::domain::types::{ChunkKind, ChunkRecord, ExtractedUnit, UnitType};

/// Chunk count at which a GraphQL type is split into field groups, and
/// the size of each group.
const GRAPHQL_FIELD_GROUP_SIZE: usize = 10;
/// Controller action count above which per-action chunking kicks in.
const CONTROLLER_ACTION_THRESHOLD: usize = 5;
/// Model LOC bands from spec.md §4.1.
const MODEL_WHOLE_LOC_CEILING: usize = 100;
const MODEL_OVERSIZE_LOC_FLOOR: usize = 500;

pub struct Chunker;

impl Chunker {
    /// Partition `unit` into chunks, splitting any chunk that still
    /// exceeds `char_ceiling` at the nearest natural (blank-line) boundary,
    /// and truncating from the middle as a last resort.
    pub fn chunk(unit: &ExtractedUnit, char_ceiling: usize) -> Vec<ChunkRecord> {
        let sections = match unit.unit_type {
            UnitType::Model => model_sections(unit),
            UnitType::Controller => controller_sections(unit),
            UnitType::GraphqlType => graphql_sections(unit),
            _ => default_sections(unit),
        };

        let mut records = Vec::new();
        for (idx, (kind, content)) in sections.into_iter().enumerate() {
            for (part_idx, part) in split_to_ceiling(&content, char_ceiling).into_iter().enumerate() {
                let chunk_id = if part_idx == 0 {
                    format!("{}::{}#{idx}", unit.identifier, kind.tag())
                } else {
                    format!("{}::{}#{idx}.{part_idx}", unit.identifier, kind.tag())
                };
                records.push(ChunkRecord::new(chunk_id, kind, part));
            }
        }
        if records.is_empty() {
            records.push(ChunkRecord::new(
                format!("{}::whole#0", unit.identifier),
                ChunkKind::Whole,
                unit.source_code.clone().unwrap_or_default(),
            ));
        }
        records
    }
}

trait ChunkKindTag {
    fn tag(&self) -> &'static str;
}
impl ChunkKindTag for ChunkKind {
    fn tag(&self) -> &'static str {
        match self {
            ChunkKind::Summary => "summary",
            ChunkKind::Associations => "associations",
            ChunkKind::Callbacks => "callbacks",
            ChunkKind::Validations => "validations",
            ChunkKind::Scopes => "scopes",
            ChunkKind::Action => "action",
            ChunkKind::FieldGroup => "fields",
            ChunkKind::Concern => "concern",
            ChunkKind::Whole => "whole",
            ChunkKind::Body => "body",
        }
    }
}

fn line_count(unit: &ExtractedUnit) -> usize {
    unit.source_code.as_deref().map(|s| s.lines().count()).unwrap_or(0)
}

fn summary_section(unit: &ExtractedUnit) -> (ChunkKind, String) {
    let summary = format!(
        "Unit {} ({}) in {}\nAssociations: {}\nValidations: {}\nCallbacks: {}",
        unit.identifier,
        unit.unit_type,
        unit.file_path,
        unit.metadata.associations.len(),
        unit.metadata.validations.len(),
        unit.metadata.callbacks.len(),
    );
    (ChunkKind::Summary, summary)
}

fn model_sections(unit: &ExtractedUnit) -> Vec<(ChunkKind, String)> {
    let loc = line_count(unit);
    if loc <= MODEL_WHOLE_LOC_CEILING {
        return vec![(ChunkKind::Whole, unit.source_code.clone().unwrap_or_default())];
    }

    let mut sections = vec![summary_section(unit)];
    if !unit.metadata.associations.is_empty() {
        sections.push((ChunkKind::Associations, unit.metadata.associations.join("\n")));
    }
    if !unit.metadata.callbacks.is_empty() {
        sections.push((ChunkKind::Callbacks, unit.metadata.callbacks.join("\n")));
    }
    if !unit.metadata.validations.is_empty() {
        sections.push((ChunkKind::Validations, unit.metadata.validations.join("\n")));
    }

    let body = unit.source_code.clone().unwrap_or_default();
    if loc > MODEL_OVERSIZE_LOC_FLOOR {
        for (i, piece) in natural_boundary_split(&body, usize::MAX).into_iter().enumerate() {
            sections.push((ChunkKind::Concern, format!("[concern {i}]\n{piece}")));
        }
    } else if !body.is_empty() {
        sections.push((ChunkKind::Body, body));
    }
    sections
}

fn controller_sections(unit: &ExtractedUnit) -> Vec<(ChunkKind, String)> {
    let actions = &unit.metadata.method_names;
    if actions.len() < CONTROLLER_ACTION_THRESHOLD {
        return vec![(ChunkKind::Whole, unit.source_code.clone().unwrap_or_default())];
    }

    let body = unit.source_code.clone().unwrap_or_default();
    actions
        .iter()
        .map(|action| {
            let snippet = extract_method_body(&body, action).unwrap_or_else(|| body.clone());
            let route = unit.metadata.route.as_deref().unwrap_or("(no route)");
            let text = format!("Action: {action}\nRoute: {route}\n\n{snippet}");
            (ChunkKind::Action, text)
        })
        .collect()
}

fn graphql_sections(unit: &ExtractedUnit) -> Vec<(ChunkKind, String)> {
    let fields = &unit.metadata.column_names;
    if fields.len() <= GRAPHQL_FIELD_GROUP_SIZE {
        return vec![(ChunkKind::Whole, unit.source_code.clone().unwrap_or_default())];
    }

    let mut sections = vec![summary_section(unit)];
    for group in fields.chunks(GRAPHQL_FIELD_GROUP_SIZE) {
        sections.push((ChunkKind::FieldGroup, group.join("\n")));
    }
    if !unit.metadata.method_names.is_empty() {
        sections.push((
            ChunkKind::Concern,
            format!("Arguments:\n{}", unit.metadata.method_names.join("\n")),
        ));
    }
    sections
}

fn default_sections(unit: &ExtractedUnit) -> Vec<(ChunkKind, String)> {
    vec![(ChunkKind::Whole, unit.source_code.clone().unwrap_or_default())]
}

/// Best-effort extraction of a named method's body from raw source: finds
/// the first line mentioning `name` and takes until the next blank line
/// run or EOF. Falls back to `None` when `name` isn't found.
fn extract_method_body(source: &str, name: &str) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines.iter().position(|l| l.contains(name))?;
    let mut end = lines.len();
    for (i, l) in lines.iter().enumerate().skip(start + 1) {
        if l.trim().is_empty() && i > start + 1 {
            end = i;
            break;
        }
    }
    Some(lines[start..end].join("\n"))
}

/// Split `content` at blank-line boundaries into pieces, each as large as
/// possible without exceeding `max_len` (ignored when `usize::MAX`, used by
/// callers that want boundary-splitting without a size target).
fn natural_boundary_split(content: &str, max_len: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = content.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    if paragraphs.is_empty() {
        return vec![content.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for p in paragraphs {
        if !current.is_empty() && current.len() + p.len() + 2 > max_len {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(p);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Split `content` to fit `char_ceiling`, using natural boundaries first
/// and a middle-preserving-head-and-tail truncation as a last resort for
/// any piece that still doesn't fit.
fn split_to_ceiling(content: &str, char_ceiling: usize) -> Vec<String> {
    if content.len() <= char_ceiling {
        return vec![content.to_string()];
    }
    natural_boundary_split(content, char_ceiling)
        .into_iter()
        .map(|piece| truncate_middle(&piece, char_ceiling))
        .collect()
}

/// Truncate preserving a head and tail, with an explicit marker noting
/// how many bytes were dropped.
pub(crate) fn truncate_middle(content: &str, char_ceiling: usize) -> String {
    if content.len() <= char_ceiling {
        return content.to_string();
    }
    let marker = "\n... [truncated] ...\n";
    let budget = char_ceiling.saturating_sub(marker.len());
    let head_len = budget / 2;
    let tail_len = budget - head_len;
    let head = floor_char_boundary(content, head_len);
    let tail_start = content.len().saturating_sub(tail_len);
    let tail_start = ceil_char_boundary(content, tail_start);
    format!("{}{}{}", &content[..head], marker, &content[tail_start..])
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::UnitMetadata;

    fn unit(unit_type: UnitType, loc: usize) -> ExtractedUnit {
        let body = (0..loc).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        ExtractedUnit {
            identifier: "Order".into(),
            unit_type,
            file_path: "app/models/order.rb".into(),
            namespace: "".into(),
            source_code: Some(body),
            metadata: UnitMetadata::default(),
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: "deadbeef".into(),
            estimated_tokens: 0,
        }
    }

    #[test]
    fn small_model_is_a_single_whole_chunk() {
        let u = unit(UnitType::Model, 20);
        let chunks = Chunker::chunk(&u, 100_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_kind, ChunkKind::Whole);
    }

    #[test]
    fn mid_size_model_splits_into_sections() {
        let u = unit(UnitType::Model, 200);
        let chunks = Chunker::chunk(&u, 100_000);
        assert!(chunks.iter().any(|c| c.chunk_kind == ChunkKind::Summary));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn oversize_chunk_is_truncated_preserving_head_and_tail() {
        let body = "X".repeat(1000);
        let truncated = truncate_middle(&body, 100);
        assert!(truncated.len() <= 100 + "\n... [truncated] ...\n".len());
        assert!(truncated.starts_with('X'));
        assert!(truncated.ends_with('X'));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn controller_below_threshold_is_whole() {
        let mut u = unit(UnitType::Controller, 50);
        u.metadata.method_names = vec!["index".into(), "show".into()];
        let chunks = Chunker::chunk(&u, 100_000);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn controller_at_threshold_chunks_per_action() {
        let mut u = unit(UnitType::Controller, 50);
        u.metadata.method_names = vec!["index".into(), "show".into(), "create".into(), "update".into(), "destroy".into()];
        let chunks = Chunker::chunk(&u, 100_000);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chunk_kind == ChunkKind::Action));
    }

    proptest::proptest! {
        /// spec.md §8 property 1: chunking is a pure function of unit
        /// content — re-chunking identical input twice yields identical
        /// chunk ids and content hashes, regardless of unit type or size.
        #[test]
        fn chunking_is_stable_across_repeated_runs(
            loc in 1usize..600,
            type_idx in 0u8..4,
            ceiling in 200usize..5000,
        ) {
            let unit_type = match type_idx {
                0 => UnitType::Model,
                1 => UnitType::Controller,
                2 => UnitType::GraphqlType,
                _ => UnitType::Service,
            };
            let mut u = unit(unit_type, loc);
            if unit_type == UnitType::Controller {
                u.metadata.method_names = vec!["index".into(), "show".into(), "create".into(), "update".into(), "destroy".into()];
            }

            let first = Chunker::chunk(&u, ceiling);
            let second = Chunker::chunk(&u, ceiling);

            let first_ids: Vec<&str> = first.iter().map(|c| c.chunk_id.as_str()).collect();
            let second_ids: Vec<&str> = second.iter().map(|c| c.chunk_id.as_str()).collect();
            prop_assert_eq!(first_ids, second_ids);

            let first_hashes: Vec<&str> = first.iter().map(|c| c.content_hash.as_str()).collect();
            let second_hashes: Vec<&str> = second.iter().map(|c| c.content_hash.as_str()).collect();
            prop_assert_eq!(first_hashes, second_hashes);
        }
    }
}
