//! Coarse importance signal carried into vector metadata for ranking
//! (spec.md §4.2).

use crate::domain::types::{ChangeFrequency, ExtractedUnit, Importance, UnitType};

/// `high` if ≥3 of the listed signals hold, `low` if none hold, else
/// `medium`.
pub fn compute_importance(unit: &ExtractedUnit) -> Importance {
    let signals = [
        unit.metadata.callbacks.len() > 5,
        unit.metadata.associations.len() > 5,
        unit.metadata.git.change_frequency == ChangeFrequency::Hot,
        matches!(unit.unit_type, UnitType::Model | UnitType::Service),
    ];
    let hits = signals.iter().filter(|s| **s).count();
    if hits >= 3 {
        Importance::High
    } else if hits == 0 {
        Importance::Low
    } else {
        Importance::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{GitMetadata, UnitMetadata};

    fn unit(unit_type: UnitType, callbacks: usize, associations: usize, freq: ChangeFrequency) -> ExtractedUnit {
        ExtractedUnit {
            identifier: "X".into(),
            unit_type,
            file_path: "x.rb".into(),
            namespace: "".into(),
            source_code: None,
            metadata: UnitMetadata {
                callbacks: vec!["c".to_string(); callbacks],
                associations: vec!["a".to_string(); associations],
                git: GitMetadata {
                    change_frequency: freq,
                    ..Default::default()
                },
                ..Default::default()
            },
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: "h".into(),
            estimated_tokens: 0,
        }
    }

    #[test]
    fn high_when_three_signals_present() {
        let u = unit(UnitType::Model, 6, 6, ChangeFrequency::Hot);
        assert_eq!(compute_importance(&u), Importance::High);
    }

    #[test]
    fn low_when_no_signals_present() {
        let u = unit(UnitType::Route, 0, 0, ChangeFrequency::Stable);
        assert_eq!(compute_importance(&u), Importance::Low);
    }

    #[test]
    fn medium_in_between() {
        let u = unit(UnitType::Model, 0, 0, ChangeFrequency::Stable);
        assert_eq!(compute_importance(&u), Importance::Medium);
    }
}
