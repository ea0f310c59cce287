//! Engine runtime configuration
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`PROGRESSION_*`)
//! 2. Values from a TOML file ([`EngineConfig::from_toml_file`])
//! 3. Built-in defaults
//!
//! | Variable                               | Field                     | Default     |
//! |----------------------------------------|---------------------------|-------------|
//! | `PROGRESSION_EVALUATION_FALLBACK`      | `evaluation.on_unavailable` | `fail_open` |
//! | `PROGRESSION_EVALUATION_RETRIES`       | `evaluation.retries`      | 0           |
//! | `PROGRESSION_GENERATION_TIMEOUT_SECS`  | `generation_timeout_secs` | 60          |
//! | `PROGRESSION_DEFAULT_THRESHOLD`        | `default_threshold`       | 0.6         |

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{CompactionConfig, ContextBuilder};
use crate::evaluator::{EvaluationPolicy, FallbackMode};
use crate::hints::HintThresholds;

const ENV_EVALUATION_FALLBACK: &str = "PROGRESSION_EVALUATION_FALLBACK";
const ENV_EVALUATION_RETRIES: &str = "PROGRESSION_EVALUATION_RETRIES";
const ENV_GENERATION_TIMEOUT_SECS: &str = "PROGRESSION_GENERATION_TIMEOUT_SECS";
const ENV_DEFAULT_THRESHOLD: &str = "PROGRESSION_DEFAULT_THRESHOLD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the progression engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// What happens when rubric scoring fails
    pub evaluation: EvaluationPolicy,
    /// Default hint ladder thresholds
    pub hints: HintThresholds,
    /// History compaction thresholds
    pub compaction: CompactionConfig,
    /// Upper bound on any single generation call
    pub generation_timeout_secs: u64,
    /// Pass threshold for `ai_evaluation` Nodes that declare none
    pub default_threshold: f64,
    /// Characters kept from each earlier Node's deliverable in prompts
    pub prior_output_chars: usize,
    /// Token budget for a mentor reply
    pub max_reply_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationPolicy::default(),
            hints: HintThresholds::default(),
            compaction: CompactionConfig::default(),
            generation_timeout_secs: 60,
            default_threshold: 0.6,
            prior_output_chars: 500,
            max_reply_tokens: 1024,
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&source)?;
        config.validate()?;
        Ok(config.with_env_overrides())
    }

    /// Apply `PROGRESSION_*` overrides. Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = env::var(ENV_EVALUATION_FALLBACK) {
            match raw.parse::<FallbackMode>() {
                Ok(mode) => self.evaluation.on_unavailable = mode,
                Err(e) => warn!(var = ENV_EVALUATION_FALLBACK, error = %e, "Ignoring override"),
            }
        }
        if let Some(retries) = parsed_env::<u32>(ENV_EVALUATION_RETRIES) {
            self.evaluation.retries = retries;
        }
        if let Some(secs) = parsed_env::<u64>(ENV_GENERATION_TIMEOUT_SECS).filter(|s| *s > 0) {
            self.generation_timeout_secs = secs;
        }
        if let Some(threshold) =
            parsed_env::<f64>(ENV_DEFAULT_THRESHOLD).filter(|t| (0.0..=1.0).contains(t))
        {
            self.default_threshold = threshold;
        }
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(ConfigError::Invalid(format!(
                "default_threshold must be within [0, 1], got {}",
                self.default_threshold
            )));
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation_timeout_secs must be positive".to_string(),
            ));
        }
        if self.compaction.retain > self.compaction.threshold {
            return Err(ConfigError::Invalid(format!(
                "compaction.retain ({}) exceeds compaction.threshold ({})",
                self.compaction.retain, self.compaction.threshold
            )));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn context_builder(&self) -> ContextBuilder {
        ContextBuilder::new(self.compaction, self.prior_output_chars)
    }
}

fn parsed_env<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}
