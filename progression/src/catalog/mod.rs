//! Step Catalog: immutable registry of the curriculum
//!
//! The catalog is built once at startup, either from the built-in curriculum
//! ([`StepCatalog::builtin`]) or from a TOML/YAML file, and validated before
//! use. Lookups are index-based: step `n` lives at `steps[n - 1]` and Node
//! `s.o` at `steps[s - 1].nodes[o - 1]`.
//!
//! # Layout
//!
//! ```text
//! Step 1 ── 1.1 ── 1.2 ── 1.3
//!                           │
//! Step 2 ── 2.1 ── 2.2 ── 2.3
//!                           │
//!  ...                     ...
//!                           │
//! Step N ── N.1 ── ... ── N.k ── (finished)
//! ```

pub mod builtin;
pub mod types;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hints::HintThresholds;

pub use types::{
    CompletionCriteria, Criterion, DeliverableSpec, FieldKind, FormField, FormSchema, HintKind,
    HintLevel, NodeDefinition, NodeId, NodeInput, NodeKind, ParseNodeIdError, StepDefinition,
};

/// Errors raised while loading or validating a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog has no steps")]
    Empty,

    #[error("step at position {position} has number {found} (steps must be numbered 1..N in order)")]
    StepOutOfOrder { position: usize, found: u32 },

    #[error("step {step} has no nodes")]
    EmptyStep { step: u32 },

    #[error("step {step} position {position} holds node {found} (expected {expected})")]
    NodeOutOfOrder {
        step: u32,
        position: usize,
        found: NodeId,
        expected: NodeId,
    },

    #[error("node {node}: {message}")]
    InvalidNode { node: NodeId, message: String },

    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("unsupported catalog file extension: {0}")]
    UnsupportedFormat(String),
}

/// On-disk catalog layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub steps: Vec<StepDefinition>,
}

/// Validated, immutable curriculum
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
}

impl StepCatalog {
    /// Build and validate a catalog, filling unset hint thresholds.
    pub fn new(mut steps: Vec<StepDefinition>, thresholds: &HintThresholds) -> Result<Self, CatalogError> {
        for step in &mut steps {
            for node in &mut step.nodes {
                for hint in &mut node.hints {
                    if hint.min_turns.is_none() {
                        hint.min_turns = Some(thresholds.for_level(hint.level));
                    }
                }
            }
        }
        validate(&steps)?;
        Ok(Self { steps })
    }

    /// The built-in curriculum.
    pub fn builtin(thresholds: &HintThresholds) -> Result<Self, CatalogError> {
        Self::new(builtin::steps(), thresholds)
    }

    /// Parse a TOML catalog.
    pub fn from_toml_str(source: &str, thresholds: &HintThresholds) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(source).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.steps, thresholds)
    }

    /// Parse a YAML catalog.
    pub fn from_yaml_str(source: &str, thresholds: &HintThresholds) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_yaml::from_str(source).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.steps, thresholds)
    }

    /// Load a catalog file, choosing the format by extension.
    pub fn from_path(path: impl AsRef<Path>, thresholds: &HintThresholds) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source, thresholds),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source, thresholds),
            other => Err(CatalogError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, step_number: u32) -> Option<&StepDefinition> {
        let index = usize::try_from(step_number).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeDefinition> {
        let index = usize::try_from(id.ordinal).ok()?.checked_sub(1)?;
        self.step(id.step)?.nodes.get(index)
    }

    /// Resolve a caller-supplied `(step, node_id)` pair.
    ///
    /// Returns `None` if the id does not parse, does not belong to `step`, or
    /// is not in the catalog.
    pub fn lookup(&self, step_number: u32, node_id: &str) -> Option<&NodeDefinition> {
        let id: NodeId = node_id.parse().ok()?;
        if id.step != step_number {
            return None;
        }
        self.node(id)
    }

    /// First Node of the curriculum.
    pub fn first_node(&self) -> NodeId {
        // validated non-empty
        self.steps[0].nodes[0].id
    }

    /// Next Node in declared order, or `None` after the last Node.
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        let next = id.next_in_step();
        if self.node(next).is_some() {
            return Some(next);
        }
        let first = id.first_of_next_step();
        self.node(first).map(|n| n.id)
    }

    /// Every Node in curriculum order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.steps.iter().flat_map(|s| s.nodes.iter())
    }

    pub fn total_nodes(&self) -> usize {
        self.steps.iter().map(|s| s.nodes.len()).sum()
    }
}

fn invalid(node: NodeId, message: impl Into<String>) -> CatalogError {
    CatalogError::InvalidNode {
        node,
        message: message.into(),
    }
}

fn validate(steps: &[StepDefinition]) -> Result<(), CatalogError> {
    if steps.is_empty() {
        return Err(CatalogError::Empty);
    }

    for (position, step) in steps.iter().enumerate() {
        if step.step_number as usize != position + 1 {
            return Err(CatalogError::StepOutOfOrder {
                position,
                found: step.step_number,
            });
        }
        if step.nodes.is_empty() {
            return Err(CatalogError::EmptyStep {
                step: step.step_number,
            });
        }
        for (index, node) in step.nodes.iter().enumerate() {
            let expected = NodeId::new(step.step_number, index as u32 + 1);
            if node.id != expected {
                return Err(CatalogError::NodeOutOfOrder {
                    step: step.step_number,
                    position: index,
                    found: node.id,
                    expected,
                });
            }
            validate_node(node)?;
        }
    }

    Ok(())
}

fn validate_node(node: &NodeDefinition) -> Result<(), CatalogError> {
    let id = node.id;

    if node.rubric.iter().any(|c| !(c.weight > 0.0) || !c.weight.is_finite()) {
        return Err(invalid(id, "rubric weights must be positive"));
    }

    match node.completion {
        CompletionCriteria::AiEvaluation { threshold } => {
            if node.rubric.is_empty() {
                return Err(invalid(id, "ai_evaluation requires a rubric"));
            }
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(invalid(id, format!("threshold {} outside [0, 1]", t)));
                }
            }
        }
        CompletionCriteria::FormComplete | CompletionCriteria::ManualReview => {}
    }

    if node.kind == NodeKind::Form && node.form.is_none() {
        return Err(invalid(id, "form node requires a form schema"));
    }

    if let Some(form) = &node.form {
        validate_fields(id, &form.fields)?;
    }

    for (index, hint) in node.hints.iter().enumerate() {
        if hint.level as usize != index + 1 {
            return Err(invalid(id, "hint levels must be contiguous from 1"));
        }
    }
    for pair in node.hints.windows(2) {
        if pair[1].min_turns() < pair[0].min_turns() {
            return Err(invalid(id, "hint thresholds must not decrease"));
        }
    }

    if let Some(spec) = &node.deliverable {
        if spec.purpose.trim().is_empty() {
            return Err(invalid(id, "deliverable purpose must not be empty"));
        }
    }

    for input in &node.inputs {
        if input.source() >= id {
            return Err(invalid(
                id,
                format!("input from {} does not precede this node", input.source()),
            ));
        }
    }

    Ok(())
}

fn validate_fields(id: NodeId, fields: &[FormField]) -> Result<(), CatalogError> {
    for field in fields {
        if field.kind == FieldKind::Array {
            if let (Some(min), Some(max)) = (field.min_items, field.max_items) {
                if min > max {
                    return Err(invalid(
                        id,
                        format!("field '{}' has min_items > max_items", field.name),
                    ));
                }
            }
            validate_fields(id, &field.item_fields)?;
        }
        if field.kind == FieldKind::Select && field.options.is_empty() {
            return Err(invalid(
                id,
                format!("select field '{}' declares no options", field.name),
            ));
        }
    }
    Ok(())
}
