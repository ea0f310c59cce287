//! Context Builder: the effective instructions and message history for a Node
//!
//! Instructions are assembled in a fixed order:
//!
//! 1. Node guidance
//! 2. Grade adaptation (when the grade is known)
//! 3. Earlier work, one line per completed Node, truncated
//! 4. Declared carry-over inputs resolved through [`PriorOutputs::resolve`]
//! 5. The active hint directive, if a hint fired on this turn
//!
//! History is converted to chat messages and compacted when long.

pub mod compaction;
pub mod prior;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{HintLevel, NodeDefinition};
use crate::generation::{ChatMessage, GenerationRequest};
use crate::hints::hint_directive;
use crate::model::{ConversationTurn, LearnerProfile, TurnRole};

pub use compaction::{compact, CompactionConfig};
pub use prior::{truncate_chars, PriorOutput, PriorOutputs};

/// Assembled context for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    pub instructions: String,
    pub messages: Vec<ChatMessage>,
    /// Whether older history was collapsed into a summary turn
    pub compacted: bool,
}

impl BuiltContext {
    pub fn into_request(self, max_tokens: u32) -> GenerationRequest {
        GenerationRequest::new(self.instructions, self.messages).with_max_tokens(max_tokens)
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBuilder {
    pub compaction: CompactionConfig,
    /// Characters kept from each earlier Node's output
    pub prior_output_chars: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            compaction: CompactionConfig::default(),
            prior_output_chars: 500,
        }
    }
}

impl ContextBuilder {
    pub fn new(compaction: CompactionConfig, prior_output_chars: usize) -> Self {
        Self {
            compaction,
            prior_output_chars,
        }
    }

    /// Build the context for `node`.
    pub fn build(
        &self,
        node: &NodeDefinition,
        profile: &LearnerProfile,
        prior: &PriorOutputs,
        history: &[ConversationTurn],
        active_hint: Option<&HintLevel>,
    ) -> BuiltContext {
        let mut instructions = node.guidance.clone();

        if let Some(grade) = profile.grade {
            instructions.push_str(&format!(
                "\n\nThe learner is in grade {}. Match your vocabulary and sentence length to that age.",
                grade
            ));
        }

        if !prior.summaries.is_empty() {
            instructions.push_str("\n\n## The learner's earlier work\n");
            for output in &prior.summaries {
                instructions.push_str(&format!(
                    "\n- {} ({}): {}",
                    output.title,
                    output.node,
                    truncate_chars(&output.content, self.prior_output_chars)
                ));
            }
        }

        let carried: Vec<String> = node
            .inputs
            .iter()
            .filter_map(|input| {
                prior
                    .resolve(input)
                    .map(|text| format!("### From {}\n{}", input.source(), text))
            })
            .collect();
        if !carried.is_empty() {
            instructions.push_str("\n\n## Inputs carried over from earlier nodes\n\n");
            instructions.push_str(&carried.join("\n\n"));
        }

        if let Some(hint) = active_hint {
            instructions.push_str("\n\n## Hint\n\n");
            instructions.push_str(&hint_directive(hint));
        }

        let messages = history.iter().map(to_message).collect();
        let (messages, compacted) = compact(messages, &self.compaction);
        if compacted {
            debug!(node = %node.id, retained = self.compaction.retain, "History compacted");
        }

        BuiltContext {
            instructions,
            messages,
            compacted,
        }
    }
}

fn to_message(turn: &ConversationTurn) -> ChatMessage {
    match turn.role {
        TurnRole::Learner => ChatMessage::user(turn.content.clone()),
        TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        TurnRole::System => match turn.event {
            Some(event) => ChatMessage::system(format!("[{}] {}", event, turn.content)),
            None => ChatMessage::system(turn.content.clone()),
        },
    }
}
