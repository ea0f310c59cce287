//! Outputs of earlier Nodes that a later Node may draw on

use std::collections::HashMap;

use serde_json::Value;

use crate::catalog::{NodeId, NodeInput};

/// Condensed artifact from a completed Node.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorOutput {
    pub node: NodeId,
    pub title: String,
    pub content: String,
}

/// Everything a Node may reference from earlier in the project.
#[derive(Debug, Clone, Default)]
pub struct PriorOutputs {
    /// Latest deliverable of each completed Node, in curriculum order
    pub summaries: Vec<PriorOutput>,
    /// Latest form payload per Node
    pub form_data: HashMap<NodeId, Value>,
    /// Learner messages per Node, oldest first
    pub learner_messages: HashMap<NodeId, Vec<String>>,
}

impl PriorOutputs {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.form_data.is_empty() && self.learner_messages.is_empty()
    }

    /// Resolve a declared carry-over input to text.
    pub fn resolve(&self, input: &NodeInput) -> Option<String> {
        match input {
            NodeInput::StructuredOutput { from } => self
                .form_data
                .get(from)
                .map(|data| serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())),
            NodeInput::LearnerMessages { from, last } => {
                let messages = self.learner_messages.get(from)?;
                if messages.is_empty() || *last == 0 {
                    return None;
                }
                let start = messages.len().saturating_sub(*last);
                Some(
                    messages[start..]
                        .iter()
                        .map(|m| format!("- {}", m))
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            }
        }
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}…", &text[..byte]),
        None => text.to_string(),
    }
}
