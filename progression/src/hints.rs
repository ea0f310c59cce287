//! Hint Escalator: pure escalation decisions over conversational stall
//!
//! ```text
//!  level 0 ──(turns ≥ 4)──▶ level 1 nudge
//!          ──(turns ≥ 8)──▶ level 2 example
//!          ──(turns ≥ 12)─▶ level 3 escalate (flag for a teacher)
//! ```
//!
//! One level per call, never skipping. The recorded level only grows; a new
//! Node starts again at 0 because every Node record starts at 0.

use serde::{Deserialize, Serialize};

use crate::catalog::{HintKind, HintLevel};

/// Default learner-turn thresholds for the first three hint levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HintThresholds {
    /// Turns before level 1
    pub nudge: u32,
    /// Turns before level 2
    pub example: u32,
    /// Turns before level 3
    pub escalate: u32,
}

impl Default for HintThresholds {
    fn default() -> Self {
        Self {
            nudge: 4,
            example: 8,
            escalate: 12,
        }
    }
}

impl HintThresholds {
    /// Threshold for a ladder level. Levels past 3 keep the same spacing.
    pub fn for_level(&self, level: u32) -> u32 {
        match level {
            0 => 0,
            1 => self.nudge,
            2 => self.example,
            3 => self.escalate,
            n => {
                let step = self.escalate.saturating_sub(self.example).max(1);
                self.escalate.saturating_add(step.saturating_mul(n - 3))
            }
        }
    }
}

/// Decide whether the next hint level fires.
///
/// `turn_count` counts learner turns on the Node, including the message being
/// sent. Returns the entry for `current_level + 1` if it exists and its
/// threshold has been reached.
pub fn next_hint(turn_count: u32, ladder: &[HintLevel], current_level: u32) -> Option<&HintLevel> {
    let candidate = current_level.checked_add(1)?;
    ladder
        .iter()
        .find(|h| h.level == candidate)
        .filter(|h| turn_count >= h.min_turns())
}

/// Instruction appended to the assistant's context while a hint is active.
pub fn hint_directive(hint: &HintLevel) -> String {
    match hint.kind {
        HintKind::Nudge => format!(
            "The learner seems stuck. Offer this gentle direction without giving the answer: {}",
            hint.content
        ),
        HintKind::Example => format!(
            "The learner is still stuck. Share this worked example, then hand the thinking back: {}",
            hint.content
        ),
        HintKind::Escalate => format!(
            "A teacher has been asked to help. Keep encouraging the learner meanwhile: {}",
            hint.content
        ),
    }
}
