//! Evaluator: rubric scoring through the generation service
//!
//! ```text
//! content + rubric ──▶ scoring request ──▶ service (timeout, retries)
//!                                              │
//!                      ┌── parsed ◀────────────┤
//!                      │                       └── failed ──▶ EvaluationPolicy fallback
//!                      ▼
//!        clamp ─▶ weighted overall ─▶ passed = overall ≥ threshold
//! ```
//!
//! Failures never surface as errors. They resolve to a policy default that is
//! marked through [`EvaluationResult::fallback`].

pub mod policy;
pub mod scoring;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Criterion;
use crate::generation::{with_timeout, GenerationService};
use crate::model::LearnerProfile;

pub use policy::{fallback_result, EvaluationPolicy, FallbackMode};
pub use scoring::{build_scoring_request, parse_scoring_response, weighted_overall, ScoringResponse};

/// Score for one rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    /// In `[0, 1]`
    pub score: f64,
    pub feedback: String,
}

/// Result of scoring one piece of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    /// Weighted average in `[0, 1]`, rounded to 4 decimals
    pub overall_score: f64,
    pub dimensions: Vec<DimensionScore>,
    pub summary: String,
    /// Set when this is a policy default rather than a real score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackMode>,
}

impl EvaluationResult {
    /// Whether the policy handed the decision to a teacher.
    pub fn needs_review(&self) -> bool {
        self.fallback == Some(FallbackMode::ManualReview)
    }
}

const DEFAULT_SUMMARY: &str = "Evaluation complete.";

/// Rubric scorer.
#[derive(Clone)]
pub struct Evaluator {
    service: Arc<dyn GenerationService>,
    policy: EvaluationPolicy,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(service: Arc<dyn GenerationService>, policy: EvaluationPolicy, timeout: Duration) -> Self {
        Self {
            service,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> EvaluationPolicy {
        self.policy
    }

    /// Score `content` against `rubric`. Never fails; see [`EvaluationPolicy`].
    pub async fn evaluate(
        &self,
        content: &str,
        rubric: &[Criterion],
        threshold: f64,
        profile: &LearnerProfile,
    ) -> EvaluationResult {
        let request = build_scoring_request(content, rubric, profile);
        let attempts = self.policy.retries.saturating_add(1);

        for attempt in 1..=attempts {
            let reply = with_timeout(self.timeout, self.service.complete(&request)).await;
            let failure = match reply {
                Ok(text) => match parse_scoring_response(&text) {
                    Ok(parsed) => return score(&parsed, rubric, threshold),
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };
            warn!(
                attempt,
                attempts,
                error = %failure,
                "Rubric scoring attempt failed"
            );
        }

        warn!(
            fallback = %self.policy.on_unavailable,
            threshold,
            "Rubric scoring unavailable, applying fallback policy"
        );
        fallback_result(self.policy.on_unavailable, rubric, threshold)
    }
}

fn score(parsed: &ScoringResponse, rubric: &[Criterion], threshold: f64) -> EvaluationResult {
    let dimensions = scoring::clamp_dimensions(parsed);
    let overall_score = weighted_overall(&dimensions, rubric);
    let passed = overall_score >= threshold;
    debug!(overall_score, threshold, passed, "Rubric scored");

    EvaluationResult {
        passed,
        overall_score,
        dimensions,
        summary: parsed
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        fallback: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, MockGenerationService};

    fn rubric() -> Vec<Criterion> {
        vec![
            Criterion::new("selection_quality", "q", 0.5),
            Criterion::new("reasoning", "r", 0.5),
        ]
    }

    fn evaluator(mock: MockGenerationService, policy: EvaluationPolicy) -> Evaluator {
        Evaluator::new(Arc::new(mock), policy, Duration::from_secs(5))
    }

    fn reply(a: f64, b: f64) -> String {
        format!(
            r#"{{"dimensions":[{{"dimension":"selection_quality","score":{}}},{{"dimension":"reasoning","score":{}}}],"summary":"ok"}}"#,
            a, b
        )
    }

    #[tokio::test]
    async fn test_below_threshold_fails_and_at_threshold_passes() {
        let mut mock = MockGenerationService::new();
        let mut replies = vec![reply(0.6, 0.6), reply(0.5, 0.6)];
        mock.expect_complete()
            .times(2)
            .returning(move |_| Ok(replies.pop().unwrap_or_default()));
        let evaluator = evaluator(mock, EvaluationPolicy::default());
        let profile = LearnerProfile::default();

        let low = evaluator.evaluate("work", &rubric(), 0.6, &profile).await;
        assert_eq!(low.overall_score, 0.55);
        assert!(!low.passed);
        assert!(low.fallback.is_none());

        let exact = evaluator.evaluate("work", &rubric(), 0.6, &profile).await;
        assert_eq!(exact.overall_score, 0.6);
        assert!(exact.passed);
    }

    #[tokio::test]
    async fn test_service_error_fails_open_by_default() {
        let mut mock = MockGenerationService::new();
        mock.expect_complete()
            .returning(|_| Err(GenerationError::Unavailable("down".to_string())));
        let evaluator = evaluator(mock, EvaluationPolicy::default());

        let result = evaluator
            .evaluate("work", &rubric(), 0.7, &LearnerProfile::default())
            .await;
        assert!(result.passed);
        assert_eq!(result.overall_score, 0.7);
        assert_eq!(result.fallback, Some(FallbackMode::FailOpen));
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_closed_when_configured() {
        let mut mock = MockGenerationService::new();
        mock.expect_complete()
            .returning(|_| Ok("I think it is quite good!".to_string()));
        let evaluator = evaluator(mock, EvaluationPolicy::new(FallbackMode::FailClosed));

        let result = evaluator
            .evaluate("work", &rubric(), 0.6, &LearnerProfile::default())
            .await;
        assert!(!result.passed);
        assert_eq!(result.overall_score, 0.0);
    }

    #[tokio::test]
    async fn test_retry_recovers_before_fallback() {
        let mut mock = MockGenerationService::new();
        let mut calls = 0;
        mock.expect_complete().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(GenerationError::RequestFailed("reset".to_string()))
            } else {
                Ok(reply(0.9, 0.9))
            }
        });
        let evaluator = evaluator(
            mock,
            EvaluationPolicy::new(FallbackMode::FailClosed).with_retries(1),
        );

        let result = evaluator
            .evaluate("work", &rubric(), 0.6, &LearnerProfile::default())
            .await;
        assert!(result.passed);
        assert_eq!(result.overall_score, 0.9);
    }

    #[tokio::test]
    async fn test_missing_summary_gets_default_text() {
        let mut mock = MockGenerationService::new();
        mock.expect_complete().returning(|_| {
            Ok(r#"{"dimensions":[{"dimension":"reasoning","score":1.0}]}"#.to_string())
        });
        let evaluator = evaluator(mock, EvaluationPolicy::default());

        let result = evaluator
            .evaluate("work", &rubric(), 0.6, &LearnerProfile::default())
            .await;
        assert_eq!(result.summary, DEFAULT_SUMMARY);
        assert_eq!(result.overall_score, 1.0);
    }

    #[tokio::test]
    async fn test_manual_review_fallback_flags_review() {
        let mut mock = MockGenerationService::new();
        mock.expect_complete()
            .returning(|_| Ok(r#"{"dimensions":[]}"#.to_string()));
        let evaluator = evaluator(mock, EvaluationPolicy::new(FallbackMode::ManualReview));

        let result = evaluator
            .evaluate("work", &rubric(), 0.6, &LearnerProfile::default())
            .await;
        assert!(!result.passed);
        assert!(result.needs_review());
    }
}
