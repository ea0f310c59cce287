//! What a Node gets when rubric scoring cannot produce a result

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::catalog::Criterion;

use super::{DimensionScore, EvaluationResult};

/// Feedback attached to every dimension of a fail-open result.
pub const AUTO_APPROVED: &str = "auto-approved";
/// Feedback attached to every dimension of a fail-closed result.
pub const UNAVAILABLE: &str = "evaluation unavailable";

/// Outcome applied when scoring fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Pass at exactly the threshold
    #[default]
    FailOpen,
    /// Fail with a zero score
    FailClosed,
    /// Fail and hand the Node to a teacher
    ManualReview,
}

impl std::fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailOpen => write!(f, "fail_open"),
            Self::FailClosed => write!(f, "fail_closed"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            "manual_review" | "manual" => Ok(Self::ManualReview),
            other => Err(format!("unknown evaluation fallback '{}'", other)),
        }
    }
}

/// Evaluation failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationPolicy {
    pub on_unavailable: FallbackMode,
    /// Extra scoring attempts before falling back
    pub retries: u32,
}

impl EvaluationPolicy {
    pub fn new(on_unavailable: FallbackMode) -> Self {
        Self {
            on_unavailable,
            retries: 0,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Build the policy default result for `rubric`.
pub fn fallback_result(mode: FallbackMode, rubric: &[Criterion], threshold: f64) -> EvaluationResult {
    let (passed, overall, score, feedback, summary) = match mode {
        FallbackMode::FailOpen => (
            true,
            threshold,
            threshold,
            AUTO_APPROVED,
            "Scoring was unavailable; the work was accepted automatically.",
        ),
        FallbackMode::FailClosed => (
            false,
            0.0,
            0.0,
            UNAVAILABLE,
            "Scoring was unavailable; please try again.",
        ),
        FallbackMode::ManualReview => (
            false,
            0.0,
            0.0,
            UNAVAILABLE,
            "Scoring was unavailable; a teacher will review this work.",
        ),
    };

    EvaluationResult {
        passed,
        overall_score: overall,
        dimensions: rubric
            .iter()
            .map(|c| DimensionScore {
                dimension: c.dimension.clone(),
                score,
                feedback: feedback.to_string(),
            })
            .collect(),
        summary: summary.to_string(),
        fallback: Some(mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Vec<Criterion> {
        vec![
            Criterion::new("depth", "d", 0.5),
            Criterion::new("clarity", "c", 0.5),
        ]
    }

    #[test]
    fn test_fail_open_passes_at_threshold() {
        let result = fallback_result(FallbackMode::FailOpen, &rubric(), 0.7);
        assert!(result.passed);
        assert_eq!(result.overall_score, 0.7);
        assert!(result.dimensions.iter().all(|d| d.score == 0.7 && d.feedback == AUTO_APPROVED));
        assert_eq!(result.fallback, Some(FallbackMode::FailOpen));
    }

    #[test]
    fn test_fail_closed_and_manual_review_fail() {
        for mode in [FallbackMode::FailClosed, FallbackMode::ManualReview] {
            let result = fallback_result(mode, &rubric(), 0.6);
            assert!(!result.passed);
            assert_eq!(result.overall_score, 0.0);
            assert_eq!(result.fallback, Some(mode));
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fail-closed".parse::<FallbackMode>(), Ok(FallbackMode::FailClosed));
        assert_eq!("MANUAL_REVIEW".parse::<FallbackMode>(), Ok(FallbackMode::ManualReview));
        assert!("sometimes".parse::<FallbackMode>().is_err());
        assert_eq!(EvaluationPolicy::default().on_unavailable, FallbackMode::FailOpen);
    }
}
