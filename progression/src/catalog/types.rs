//! Catalog types: Steps, Nodes, rubrics, hint ladders and form schemas
//!
//! All types here are plain data. They deserialize from catalog files and
//! are never mutated after the catalog is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a Node: `"{step}.{ordinal}"`.
///
/// Ordering follows curriculum order (step first, then ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub step: u32,
    pub ordinal: u32,
}

impl NodeId {
    pub const fn new(step: u32, ordinal: u32) -> Self {
        Self { step, ordinal }
    }

    /// The Node at the next ordinal in the same step.
    pub fn next_in_step(self) -> Self {
        Self::new(self.step, self.ordinal + 1)
    }

    /// The first Node of the following step.
    pub fn first_of_next_step(self) -> Self {
        Self::new(self.step + 1, 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.ordinal)
    }
}

/// Error parsing a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id '{0}' (expected \"<step>.<ordinal>\")")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (step, ordinal) = s
            .split_once('.')
            .ok_or_else(|| ParseNodeIdError(s.to_string()))?;
        let step: u32 = step.parse().map_err(|_| ParseNodeIdError(s.to_string()))?;
        let ordinal: u32 = ordinal
            .parse()
            .map_err(|_| ParseNodeIdError(s.to_string()))?;
        if step == 0 || ordinal == 0 {
            return Err(ParseNodeIdError(s.to_string()));
        }
        Ok(Self { step, ordinal })
    }
}

impl TryFrom<String> for NodeId {
    type Error = ParseNodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// How the learner works through a Node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Structured form submission
    Form,
    /// Guided conversation with the assistant
    Conversation,
    /// Artifact produced by the generation service
    Generation,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form => write!(f, "form"),
            Self::Conversation => write!(f, "conversation"),
            Self::Generation => write!(f, "generation"),
        }
    }
}

/// One weighted rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub dimension: String,
    pub description: String,
    pub weight: f64,
}

impl Criterion {
    pub fn new(dimension: &str, description: &str, weight: f64) -> Self {
        Self {
            dimension: dimension.to_string(),
            description: description.to_string(),
            weight,
        }
    }
}

/// Kind of help a hint level provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    /// Gentle directional nudge
    Nudge,
    /// Worked example from a peer
    Example,
    /// Flag for human attention; the conversation continues
    Escalate,
}

impl fmt::Display for HintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nudge => write!(f, "nudge"),
            Self::Example => write!(f, "example"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// One rung of a Node's hint ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintLevel {
    /// 1-based level; ladders are contiguous from 1
    pub level: u32,
    pub kind: HintKind,
    pub content: String,
    /// Learner turns required before this level may fire.
    /// Filled from [`crate::HintThresholds`] when the catalog is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_turns: Option<u32>,
}

impl HintLevel {
    pub fn new(level: u32, kind: HintKind, content: &str) -> Self {
        Self {
            level,
            kind,
            content: content.to_string(),
            min_turns: None,
        }
    }

    pub fn with_min_turns(mut self, min_turns: u32) -> Self {
        self.min_turns = Some(min_turns);
        self
    }

    /// Turn threshold, falling back to the default ladder thresholds.
    pub fn min_turns(&self) -> u32 {
        self.min_turns
            .unwrap_or_else(|| crate::hints::HintThresholds::default().for_level(self.level))
    }
}

/// Input control type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Select,
    Number,
    Array,
}

/// A field in a Node's form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for `select` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
    /// Per-item schema for `array` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_fields: Vec<FormField>,
}

impl FormField {
    pub fn text(name: &str, label: &str) -> Self {
        Self::scalar(name, label, FieldKind::Text)
    }

    pub fn textarea(name: &str, label: &str) -> Self {
        Self::scalar(name, label, FieldKind::Textarea)
    }

    fn scalar(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            kind,
            required: true,
            options: Vec::new(),
            min_items: None,
            max_items: None,
            item_fields: Vec::new(),
        }
    }

    pub fn array(name: &str, min_items: usize, max_items: usize, item_fields: Vec<FormField>) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            kind: FieldKind::Array,
            required: true,
            options: Vec::new(),
            min_items: Some(min_items),
            max_items: Some(max_items),
            item_fields,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Form schema attached to a Node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }
}

/// Artifact produced when a Node completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableSpec {
    /// Artifact type, e.g. `problem_description`
    pub kind: String,
    /// What the summary should contain; conditions the generator prompt
    pub purpose: String,
    #[serde(default)]
    pub auto_generate: bool,
}

/// Rule deciding when a Node is done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionCriteria {
    /// Passes once the form validates
    FormComplete,
    /// Passes when the rubric score reaches the threshold (inclusive)
    AiEvaluation {
        #[serde(default)]
        threshold: Option<f64>,
    },
    /// Only an explicit teacher approval completes the Node
    ManualReview,
}

impl CompletionCriteria {
    pub fn ai(threshold: f64) -> Self {
        Self::AiEvaluation {
            threshold: Some(threshold),
        }
    }
}

/// Declared dependency on an earlier Node's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeInput {
    /// The latest structured form data submitted on `from`
    StructuredOutput { from: NodeId },
    /// The learner's most recent `last` messages on `from`
    LearnerMessages { from: NodeId, last: usize },
}

impl NodeInput {
    pub fn source(&self) -> NodeId {
        match self {
            Self::StructuredOutput { from } | Self::LearnerMessages { from, .. } => *from,
        }
    }
}

/// One Node of the curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub title: String,
    pub kind: NodeKind,
    /// Base system guidance for the assistant
    pub guidance: String,
    #[serde(default)]
    pub rubric: Vec<Criterion>,
    #[serde(default)]
    pub hints: Vec<HintLevel>,
    #[serde(default)]
    pub form: Option<FormSchema>,
    #[serde(default)]
    pub deliverable: Option<DeliverableSpec>,
    pub completion: CompletionCriteria,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
}

impl NodeDefinition {
    /// Whether this Node's deliverable should be generated on completion.
    pub fn auto_generates(&self) -> bool {
        self.deliverable.as_ref().is_some_and(|d| d.auto_generate)
    }
}

/// One Step of the curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_number: u32,
    pub title: String,
    pub description: String,
    pub nodes: Vec<NodeDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_and_display() {
        let id: NodeId = "3.2".parse().unwrap();
        assert_eq!(id, NodeId::new(3, 2));
        assert_eq!(id.to_string(), "3.2");
    }

    #[test]
    fn test_node_id_rejects_garbage() {
        assert!("3".parse::<NodeId>().is_err());
        assert!("a.b".parse::<NodeId>().is_err());
        assert!("0.1".parse::<NodeId>().is_err());
        assert!("1.0".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_ordering_follows_curriculum() {
        assert!(NodeId::new(1, 3) < NodeId::new(2, 1));
        assert!(NodeId::new(2, 1) < NodeId::new(2, 2));
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let json = serde_json::to_string(&NodeId::new(1, 2)).unwrap();
        assert_eq!(json, "\"1.2\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeId::new(1, 2));
    }

    #[test]
    fn test_completion_criteria_tagged() {
        let c: CompletionCriteria =
            serde_json::from_str(r#"{"kind":"ai_evaluation","threshold":0.7}"#).unwrap();
        assert_eq!(c, CompletionCriteria::ai(0.7));
        let c: CompletionCriteria = serde_json::from_str(r#"{"kind":"manual_review"}"#).unwrap();
        assert_eq!(c, CompletionCriteria::ManualReview);
    }

    #[test]
    fn test_hint_min_turns_default() {
        let hint = HintLevel::new(2, HintKind::Example, "x");
        assert_eq!(hint.min_turns(), 8);
        assert_eq!(hint.with_min_turns(5).min_turns(), 5);
    }
}
