//! Scans a feedback window and emits prioritized gap signals (spec.md
//! §4.11).

use super::store::FeedbackEntry;
use serde::Serialize;
use std::collections::BTreeMap;

const LOW_SCORE_THRESHOLD: f64 = 0.60;
const REPEATED_GAP_THRESHOLD: usize = 3;
const CHRONIC_TRUNCATION_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    ZeroResult,
    LowTopScore,
    RepeatedIdentifierGap,
    ChronicTruncation,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapSignal {
    pub kind: GapKind,
    pub priority: Priority,
    pub detail: String,
}

pub struct GapDetector;

impl GapDetector {
    pub fn detect(entries: &[FeedbackEntry]) -> Vec<GapSignal> {
        let mut signals = Vec::new();
        signals.extend(Self::zero_result_and_low_score(entries));
        signals.extend(Self::repeated_identifier_gaps(entries));
        signals.extend(Self::chronic_truncation(entries));
        signals
    }

    fn zero_result_and_low_score(entries: &[FeedbackEntry]) -> Vec<GapSignal> {
        let mut signals = Vec::new();
        for entry in entries {
            if let FeedbackEntry::RetrievalTrace {
                query, result_count, top_score, ..
            } = entry
            {
                if *result_count == 0 {
                    signals.push(GapSignal {
                        kind: GapKind::ZeroResult,
                        priority: Priority::High,
                        detail: format!("query returned no results: {query}"),
                    });
                } else if *top_score < LOW_SCORE_THRESHOLD {
                    signals.push(GapSignal {
                        kind: GapKind::LowTopScore,
                        priority: Priority::Medium,
                        detail: format!("query's top score {top_score:.2} is below {LOW_SCORE_THRESHOLD}: {query}"),
                    });
                }
            }
        }
        signals
    }

    fn repeated_identifier_gaps(entries: &[FeedbackEntry]) -> Vec<GapSignal> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in entries {
            if let FeedbackEntry::Gap {
                expected_identifier: Some(id),
                ..
            } = entry
            {
                *counts.entry(id.as_str()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= REPEATED_GAP_THRESHOLD)
            .map(|(id, count)| GapSignal {
                kind: GapKind::RepeatedIdentifierGap,
                priority: Priority::High,
                detail: format!("{id} reported missing in {count} gap reports"),
            })
            .collect()
    }

    fn chronic_truncation(entries: &[FeedbackEntry]) -> Vec<GapSignal> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in entries {
            if let FeedbackEntry::RetrievalTrace { truncated_units, .. } = entry {
                for unit in truncated_units {
                    *counts.entry(unit.as_str()).or_insert(0) += 1;
                }
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= CHRONIC_TRUNCATION_THRESHOLD)
            .map(|(id, count)| GapSignal {
                kind: GapKind::ChronicTruncation,
                priority: Priority::Low,
                detail: format!("{id} truncated in {count} retrievals this window"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trace(query: &str, result_count: usize, top_score: f64, truncated: Vec<&str>) -> FeedbackEntry {
        FeedbackEntry::RetrievalTrace {
            query: query.to_string(),
            result_count,
            top_score,
            truncated_units: truncated.into_iter().map(String::from).collect(),
            recorded_at: Utc::now(),
        }
    }

    fn gap(expected_identifier: &str) -> FeedbackEntry {
        FeedbackEntry::Gap {
            description: "missing".into(),
            query: None,
            expected_type: None,
            expected_identifier: Some(expected_identifier.to_string()),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn zero_result_query_is_high_priority() {
        let entries = vec![trace("find Widget", 0, 0.0, vec![])];
        let signals = GapDetector::detect(&entries);
        assert!(signals.iter().any(|s| s.kind == GapKind::ZeroResult && s.priority == Priority::High));
    }

    #[test]
    fn low_top_score_is_medium_priority() {
        let entries = vec![trace("find Widget", 3, 0.4, vec![])];
        let signals = GapDetector::detect(&entries);
        assert!(signals.iter().any(|s| s.kind == GapKind::LowTopScore && s.priority == Priority::Medium));
    }

    #[test]
    fn healthy_retrieval_emits_no_signal() {
        let entries = vec![trace("find Widget", 5, 0.9, vec![])];
        let signals = GapDetector::detect(&entries);
        assert!(signals.is_empty());
    }

    #[test]
    fn three_repeated_gap_reports_are_high_priority() {
        let entries = vec![gap("Widget"), gap("Widget"), gap("Widget")];
        let signals = GapDetector::detect(&entries);
        assert!(signals.iter().any(|s| s.kind == GapKind::RepeatedIdentifierGap && s.priority == Priority::High));
    }

    #[test]
    fn two_gap_reports_do_not_trigger() {
        let entries = vec![gap("Widget"), gap("Widget")];
        assert!(GapDetector::detect(&entries).is_empty());
    }

    #[test]
    fn chronic_truncation_is_low_priority() {
        let entries = vec![
            trace("q1", 3, 0.9, vec!["BigModel"]),
            trace("q2", 3, 0.9, vec!["BigModel"]),
            trace("q3", 3, 0.9, vec!["BigModel"]),
        ];
        let signals = GapDetector::detect(&entries);
        assert!(signals.iter().any(|s| s.kind == GapKind::ChronicTruncation && s.priority == Priority::Low));
    }
}
