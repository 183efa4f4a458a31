//! Requirement attribution from a single holistic AI score.
//!
//! This is a known approximation, not a rubric: a requirement counts as matched
//! when its label and any `matched_requirements` entry contain one another,
//! ignoring case. Matched requirements get 80% of the AI score and unmatched ones
//! 30%, scaled by the requirement weight and clamped to the 0-10 scale.

use super::super::domain::{EvaluationResult, Requirement, ScoreDraft, ScoreSource};

pub(crate) const MAX_SCORE: f64 = 10.0;
pub(crate) const MATCHED_FACTOR: f64 = 0.8;
pub(crate) const UNMATCHED_FACTOR: f64 = 0.3;

pub(crate) fn is_matched(label: &str, matched_requirements: &[String]) -> bool {
    let label = label.to_lowercase();
    matched_requirements.iter().any(|entry| {
        let entry = entry.to_lowercase();
        entry.contains(&label) || label.contains(&entry)
    })
}

pub(crate) fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, MAX_SCORE)
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn requirement_score(ai_score: f64, weight: f64, matched: bool) -> f64 {
    let factor = if matched {
        MATCHED_FACTOR
    } else {
        UNMATCHED_FACTOR
    };
    round_hundredths(clamp_score(ai_score * factor * weight))
}

pub(crate) fn derive_scores(requirements: &[Requirement], result: &EvaluationResult) -> Vec<ScoreDraft> {
    requirements
        .iter()
        .map(|requirement| ScoreDraft {
            requirement_id: requirement.id.clone(),
            source: ScoreSource::Ai,
            value: requirement_score(
                result.score,
                requirement.weight,
                is_matched(&requirement.label, &result.matched_requirements),
            ),
        })
        .collect()
}

/// Mean of requirement scores rescaled so each requirement contributes out of 10.
pub(crate) fn mean_rescaled(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / (values.len() as f64 * MAX_SCORE) * MAX_SCORE)
}
