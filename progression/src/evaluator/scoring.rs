//! Scoring prompt contract and response parsing

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::Criterion;
use crate::generation::{ChatMessage, GenerationRequest};
use crate::model::LearnerProfile;

use super::DimensionScore;

/// Outermost `{ ... }` span, tolerating prose or code fences around it.
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON_OBJECT regex should compile"));

/// Reply shape the scoring model must produce.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScoringResponse {
    /// One entry per rubric dimension
    pub dimensions: Vec<ScoredDimension>,
    /// One or two sentences of overall feedback for the learner
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScoredDimension {
    /// Dimension name exactly as given in the rubric
    pub dimension: String,
    /// Score between 0.0 and 1.0
    pub score: f64,
    /// Specific, encouraging feedback
    #[serde(default)]
    pub feedback: String,
}

/// Why a reply could not be turned into scores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringParseError {
    #[error("reply contains no JSON object")]
    NoJson,
    #[error("malformed scoring JSON: {0}")]
    Malformed(String),
    #[error("reply lists no dimensions")]
    NoDimensions,
}

/// Build the scoring request for `content` against `rubric`.
pub fn build_scoring_request(
    content: &str,
    rubric: &[Criterion],
    profile: &LearnerProfile,
) -> GenerationRequest {
    let schema = schemars::schema_for!(ScoringResponse);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();

    let criteria = rubric
        .iter()
        .map(|c| format!("- {} (weight {}): {}", c.dimension, c.weight, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    let mut system = format!(
        "You assess a school-age learner's project work against a rubric.\n\n\
         ## Rubric\n\n{}\n\n\
         Score every dimension from 0.0 to 1.0. Judge the learner's own thinking, \
         not polish.",
        criteria
    );
    if let Some(grade) = profile.grade {
        system.push_str(&format!(
            "\n\nThe learner is in grade {}. Calibrate expectations to that age.",
            grade
        ));
    }
    system.push_str(&format!(
        "\n\n## Response format\n\nReply with a single JSON object matching this schema and nothing else:\n\n{}",
        schema
    ));

    GenerationRequest::new(
        system,
        vec![ChatMessage::user(format!("## Work to assess\n\n{}", content))],
    )
    .with_temperature(0.0)
    .with_max_tokens(1024)
}

/// Extract and deserialize the scoring object from a model reply.
pub fn parse_scoring_response(reply: &str) -> Result<ScoringResponse, ScoringParseError> {
    let span = JSON_OBJECT
        .find(reply)
        .ok_or(ScoringParseError::NoJson)?;
    let parsed: ScoringResponse = serde_json::from_str(span.as_str())
        .map_err(|e| ScoringParseError::Malformed(e.to_string()))?;
    if parsed.dimensions.is_empty() {
        return Err(ScoringParseError::NoDimensions);
    }
    Ok(parsed)
}

/// Clamp parsed scores into `[0, 1]`.
pub fn clamp_dimensions(response: &ScoringResponse) -> Vec<DimensionScore> {
    response
        .dimensions
        .iter()
        .map(|d| DimensionScore {
            dimension: d.dimension.clone(),
            score: if d.score.is_finite() {
                d.score.clamp(0.0, 1.0)
            } else {
                0.0
            },
            feedback: d.feedback.clone(),
        })
        .collect()
}

/// `Σ(score × weight) / Σ(weight)` over the scored dimensions, rounded to 4
/// decimals. Dimensions absent from the rubric weigh `1 / rubric.len()`.
pub fn weighted_overall(dimensions: &[DimensionScore], rubric: &[Criterion]) -> f64 {
    let default_weight = 1.0 / rubric.len().max(1) as f64;
    let (weighted, total) = dimensions.iter().fold((0.0, 0.0), |(weighted, total), d| {
        let weight = rubric
            .iter()
            .find(|c| c.dimension == d.dimension)
            .map(|c| c.weight)
            .unwrap_or(default_weight);
        (weighted + d.score * weight, total + weight)
    });
    if total <= 0.0 {
        return 0.0;
    }
    round4((weighted / total).clamp(0.0, 1.0))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
