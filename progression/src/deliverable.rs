//! Deliverable Generator: summary artifacts built from the learner's own inputs
//!
//! The generator prompt asks the service to organize, not to add. When the
//! service fails, times out, or returns nothing, the document falls back to
//! the learner's raw text: learner turns first, then the text leaves of the
//! form payload. Mentor replies never appear in the fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::generation::{with_timeout, ChatMessage, GenerationRequest, GenerationService};
use crate::model::{ConversationTurn, TurnRole};

/// Inputs accumulated on a Node.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    /// Full Node transcript
    pub transcript: Vec<ConversationTurn>,
    /// Latest form payload, if any
    pub form_data: Option<Value>,
}

impl NodeInputs {
    /// Transcript with speaker tags, for prompts and source snapshots.
    pub fn rendered_turns(&self) -> Vec<String> {
        self.transcript
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .map(|t| {
                let speaker = match t.role {
                    TurnRole::Learner => "Learner",
                    _ => "Mentor",
                };
                format!("{}: {}", speaker, t.content)
            })
            .collect()
    }

    /// The learner's own words only.
    pub fn learner_text(&self) -> String {
        let mut parts: Vec<String> = self
            .transcript
            .iter()
            .filter(|t| t.role == TurnRole::Learner)
            .map(|t| t.content.clone())
            .collect();
        if let Some(data) = &self.form_data {
            collect_strings(data, &mut parts);
        }
        parts.join("\n\n")
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Generated document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub text: String,
    /// Raw-text fallback was used
    pub degraded: bool,
}

/// Summarizes a completed Node's learner inputs.
#[derive(Clone)]
pub struct DeliverableGenerator {
    service: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl DeliverableGenerator {
    pub fn new(service: Arc<dyn GenerationService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Generate a document for `purpose`. Never fails.
    pub async fn generate(&self, inputs: &NodeInputs, purpose: &str) -> GeneratedDocument {
        let request = build_request(inputs, purpose);
        let reply = with_timeout(self.timeout, self.service.complete(&request)).await;

        match reply {
            Ok(text) if !text.trim().is_empty() => GeneratedDocument {
                text: text.trim().to_string(),
                degraded: false,
            },
            Ok(_) => {
                warn!("Deliverable generation returned empty text, using learner text");
                fallback(inputs)
            }
            Err(e) => {
                warn!(error = %e, "Deliverable generation failed, using learner text");
                fallback(inputs)
            }
        }
    }
}

fn fallback(inputs: &NodeInputs) -> GeneratedDocument {
    GeneratedDocument {
        text: inputs.learner_text(),
        degraded: true,
    }
}

fn build_request(inputs: &NodeInputs, purpose: &str) -> GenerationRequest {
    let system = format!(
        "You turn a learner's project work into a short document.\n\n\
         Purpose: {}\n\n\
         Rules:\n\
         - Use only what the learner said or wrote. Do not add ideas, facts or opinions.\n\
         - Keep the learner's own wording wherever possible.\n\
         - Organize and tidy; do not embellish.",
        purpose
    );

    let mut material = String::new();
    let turns = inputs.rendered_turns();
    if !turns.is_empty() {
        material.push_str("## Conversation\n\n");
        material.push_str(&turns.join("\n"));
    }
    if let Some(data) = &inputs.form_data {
        if !material.is_empty() {
            material.push_str("\n\n");
        }
        material.push_str("## Form answers\n\n");
        material.push_str(&serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()));
    }

    GenerationRequest::new(system, vec![ChatMessage::user(material)])
        .with_temperature(0.3)
        .with_max_tokens(2048)
}
