//! Progress persistence
//!
//! The engine talks to storage only through [`ProgressStore`]. Every
//! state-machine mutation goes through a compare-and-swap
//! ([`ProgressStore::transition_node`], [`ProgressStore::set_hint_level`]) so
//! concurrent requests against one project serialize in the store rather than
//! in the engine.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: process-local, for tests, simulation and single-process use
//! - `RocksStore`: RocksDB with optimistic transactions (`durable` feature)
//!
//! # Keyspace
//!
//! - project state: one per project
//! - node records: one per `(project, node)`, created when the Node is reached
//! - turns: append-only, store-assigned `seq` in creation order per project
//! - submissions: append-only; the latest per Node is authoritative
//! - deliverables: versioned per Node, `version = max + 1`

pub mod memory;
#[cfg(feature = "durable")]
pub mod rocks;
#[cfg(feature = "durable")]
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::NodeId;
use crate::evaluator::EvaluationResult;
use crate::model::{
    ConversationTurn, Deliverable, DeliverableStatus, FormSubmission, NewDeliverable, NodeKey,
    NodeProgressRecord, NodeStatus, ProjectProgressState,
};

pub use memory::MemoryStore;
#[cfg(feature = "durable")]
pub use rocks::RocksStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "durable")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a compare-and-swap on a Node record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The record was in an expected state and now holds the new one
    Applied(NodeProgressRecord),
    /// The record was absent (`None`) or in another state
    Conflict(Option<NodeProgressRecord>),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Apply a status change to a record in place.
///
/// Shared by the store implementations so timestamps behave identically.
pub(crate) fn apply_status(record: &mut NodeProgressRecord, to: NodeStatus, at: DateTime<Utc>) {
    record.status = to;
    match to {
        NodeStatus::Completed => record.completed_at = Some(at),
        NodeStatus::InProgress if record.started_at.is_none() => record.started_at = Some(at),
        _ => {}
    }
}

/// Persistence contract consumed by the progression engine.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    // ---- projects ----

    /// Create a project together with its first Node record.
    ///
    /// Returns `false` (and writes nothing) if the project already exists.
    async fn create_project(
        &self,
        state: ProjectProgressState,
        first: NodeProgressRecord,
    ) -> StoreResult<bool>;

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<ProjectProgressState>>;

    async fn put_project(&self, state: &ProjectProgressState) -> StoreResult<()>;

    // ---- node records ----

    async fn get_node(&self, key: &NodeKey) -> StoreResult<Option<NodeProgressRecord>>;

    /// All Node records of a project, in curriculum order.
    async fn list_nodes(&self, project_id: &str) -> StoreResult<Vec<NodeProgressRecord>>;

    /// Make a Node reachable: create it `in_progress`, or move a
    /// `not_started` record to `in_progress`. Any other existing record is
    /// returned unchanged.
    async fn activate_node(&self, key: &NodeKey, at: DateTime<Utc>) -> StoreResult<NodeProgressRecord>;

    /// Move the record to `to` iff its current status is one of `from`.
    async fn transition_node(
        &self,
        key: &NodeKey,
        from: &[NodeStatus],
        to: NodeStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transition>;

    /// Set the hint level iff it currently equals `expected`.
    async fn set_hint_level(&self, key: &NodeKey, expected: u32, level: u32) -> StoreResult<bool>;

    // ---- turns ----

    /// Append turns atomically, assigning consecutive `seq` values.
    async fn append_turns(&self, turns: Vec<ConversationTurn>) -> StoreResult<Vec<ConversationTurn>>;

    /// Turns scoped to one Node, in `seq` order.
    async fn list_turns(&self, project_id: &str, node: NodeId) -> StoreResult<Vec<ConversationTurn>>;

    /// Every turn of a project (Node-scoped and project-scoped), in `seq` order.
    async fn list_project_turns(&self, project_id: &str) -> StoreResult<Vec<ConversationTurn>>;

    // ---- submissions ----

    async fn insert_submission(&self, submission: &FormSubmission) -> StoreResult<()>;

    async fn attach_evaluation(
        &self,
        project_id: &str,
        submission_id: Uuid,
        evaluation: &EvaluationResult,
    ) -> StoreResult<()>;

    async fn latest_submission(&self, key: &NodeKey) -> StoreResult<Option<FormSubmission>>;

    /// All submissions of a project, oldest first.
    async fn list_submissions(&self, project_id: &str) -> StoreResult<Vec<FormSubmission>>;

    // ---- deliverables ----

    /// Persist a new version (`max + 1` for the Node, starting at 1).
    async fn insert_deliverable(&self, deliverable: NewDeliverable) -> StoreResult<Deliverable>;

    /// All deliverables of a project, by Node then version.
    async fn list_deliverables(&self, project_id: &str) -> StoreResult<Vec<Deliverable>>;

    async fn get_deliverable(&self, project_id: &str, id: Uuid) -> StoreResult<Option<Deliverable>>;

    async fn set_deliverable_status(
        &self,
        project_id: &str,
        id: Uuid,
        status: DeliverableStatus,
    ) -> StoreResult<Option<Deliverable>>;
}
