//! Engine error types
//!
//! Evaluation and deliverable failures never appear here; they resolve to
//! fallbacks inside the engine. Persistence failures always do.

use thiserror::Error;
use uuid::Uuid;

use crate::catalog::NodeId;
use crate::form::FieldError;
use crate::model::NodeStatus;
use crate::store::StoreError;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// No project with this id
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// The `(step, node)` pair does not name a catalog Node
    #[error("No node '{node}' in step {step}")]
    ConfigNotFound { step: u32, node: String },

    /// The form payload did not match the schema; nothing was recorded
    #[error("Form validation failed: {}", describe(.0))]
    ValidationFailed(Vec<FieldError>),

    /// The Node lies ahead of the project's current position
    #[error("Node {node} has not been reached")]
    NodeNotReached { node: NodeId },

    /// The Node's status does not allow the requested action
    #[error("Cannot {action} node {node} while it is {from}")]
    InvalidTransition {
        node: NodeId,
        from: NodeStatus,
        action: &'static str,
    },

    /// Form submitted to a Node without a form schema
    #[error("Node {0} does not accept form submissions")]
    NoFormSchema(NodeId),

    /// Deliverable action on a Node that declares none
    #[error("Node {0} has no deliverable")]
    NoDeliverableSpec(NodeId),

    /// No deliverable with this id in the project
    #[error("Deliverable not found: {0}")]
    DeliverableNotFound(Uuid),

    /// The store rejected a read or write
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// Machine-readable code for API layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::NodeNotReached { .. } => "NODE_NOT_REACHED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NoFormSchema(_) => "NO_FORM_SCHEMA",
            Self::NoDeliverableSpec(_) => "NO_DELIVERABLE_SPEC",
            Self::DeliverableNotFound(_) => "DELIVERABLE_NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE",
        }
    }

    /// Whether the caller sent a request that can never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_paths() {
        let err = EngineError::ValidationFailed(vec![
            FieldError {
                path: "observations".to_string(),
                message: "needs at least 3 items (got 2)".to_string(),
            },
            FieldError {
                path: "observations[0].who".to_string(),
                message: "is required".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("observations: needs at least 3"));
        assert!(text.contains("observations[0].who: is required"));
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_persistence_is_not_client_error() {
        let err: EngineError = StoreError::LockPoisoned.into();
        assert!(!err.is_client_error());
        assert!(EngineError::ProjectNotFound("p".to_string()).is_client_error());
    }
}
