//! History compaction: long transcripts collapse into one summary turn
//!
//! ```text
//! [t1 t2 ... t(n-10)] [t(n-9) ... tn]
//!        │                  │
//!        ▼                  ▼
//!  one system summary   kept verbatim
//! ```
//!
//! The summary is mechanical: speaker plus excerpt per turn.

use serde::{Deserialize, Serialize};

use crate::generation::{ChatMessage, MessageRole};

use super::prior::truncate_chars;

/// Compaction thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Compact once history holds more than this many turns
    pub threshold: usize,
    /// Most recent turns kept verbatim
    pub retain: usize,
    /// Characters kept from each summarized turn
    pub excerpt_chars: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            retain: 10,
            excerpt_chars: 80,
        }
    }
}

fn speaker(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "learner",
        MessageRole::Assistant => "mentor",
        MessageRole::System => "note",
    }
}

/// Compact `history` if it exceeds the threshold.
///
/// Returns the new history and whether compaction happened. The last
/// `retain` turns are returned unchanged.
pub fn compact(history: Vec<ChatMessage>, config: &CompactionConfig) -> (Vec<ChatMessage>, bool) {
    if history.len() <= config.threshold || history.len() <= config.retain {
        return (history, false);
    }

    let split = history.len() - config.retain;
    let mut history = history;
    let recent = history.split_off(split);

    let lines = history
        .iter()
        .map(|m| format!("{}: {}", speaker(m.role), truncate_chars(&m.content, config.excerpt_chars)))
        .collect::<Vec<_>>()
        .join("\n");
    let summary = ChatMessage::system(format!(
        "Summary of the earlier conversation ({} turns):\n{}",
        history.len(),
        lines
    ));

    let mut compacted = Vec::with_capacity(recent.len() + 1);
    compacted.push(summary);
    compacted.extend(recent);
    (compacted, true)
}
