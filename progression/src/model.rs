//! Persistent entities: project state, Node records, turns, submissions, deliverables
//!
//! Everything here is owned by the store and mutated only through the
//! progression engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::NodeId;
use crate::evaluator::EvaluationResult;

/// Lifecycle of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    /// Every Node of the curriculum is complete
    Completed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Per-Node state machine.
///
/// ```text
/// not_started ──▶ in_progress ──▶ completed
///                   ▲     │
///                   │     ▼
///                needs_review ──(teacher approval)──▶ completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Completed,
    /// Waiting on a teacher
    NeedsReview,
}

impl NodeStatus {
    /// Whether the learner is currently working on (or blocked at) this Node.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::InProgress | Self::NeedsReview)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::NeedsReview => write!(f, "needs_review"),
        }
    }
}

/// What the engine knows about the learner, used to adapt prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// School grade, if known
    #[serde(default)]
    pub grade: Option<u8>,
}

impl LearnerProfile {
    pub fn with_grade(grade: u8) -> Self {
        Self { grade: Some(grade) }
    }
}

/// Identifies one Node of one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub project_id: String,
    pub node: NodeId,
}

impl NodeKey {
    pub fn new(project_id: &str, node: NodeId) -> Self {
        Self {
            project_id: project_id.to_string(),
            node,
        }
    }

    pub fn step(&self) -> u32 {
        self.node.step
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.node)
    }
}

/// Where a project is in the curriculum. Exactly one per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectProgressState {
    pub project_id: String,
    pub current_step: u32,
    pub current_node: NodeId,
    pub status: ProjectStatus,
    #[serde(default)]
    pub learner: LearnerProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectProgressState {
    pub fn new(project_id: &str, first: NodeId, learner: LearnerProfile, at: DateTime<Utc>) -> Self {
        Self {
            project_id: project_id.to_string(),
            current_step: first.step,
            current_node: first,
            status: ProjectStatus::Active,
            learner,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Per-Node progress, created the moment the Node becomes reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProgressRecord {
    pub project_id: String,
    pub node: NodeId,
    pub status: NodeStatus,
    /// Highest hint level fired so far (0 = none)
    pub hint_level: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeProgressRecord {
    /// A freshly reached Node.
    pub fn started(key: &NodeKey, at: DateTime<Utc>) -> Self {
        Self {
            project_id: key.project_id.clone(),
            node: key.node,
            status: NodeStatus::InProgress,
            hint_level: 0,
            started_at: Some(at),
            completed_at: None,
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.project_id, self.node)
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Learner,
    Assistant,
    System,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learner => write!(f, "learner"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Who left a project comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAuthor {
    Parent,
    Teacher,
}

impl std::fmt::Display for CommentAuthor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Teacher => write!(f, "teacher"),
        }
    }
}

/// Marker on system turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Learner asked for a teacher
    HelpRequested,
    /// Teacher responded
    TeacherFeedback,
    /// Project-level comment
    Comment { author: CommentAuthor },
    /// Engine flagged the Node (hint escalation, manual review, evaluation unavailable)
    ReviewRequired,
}

impl std::fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HelpRequested => write!(f, "help_requested"),
            Self::TeacherFeedback => write!(f, "teacher_feedback"),
            Self::Comment { author } => write!(f, "comment({})", author),
            Self::ReviewRequired => write!(f, "review_required"),
        }
    }
}

/// One append-only entry in a Node's (or project's) conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub project_id: String,
    /// `None` for project-scoped events such as comments
    pub node: Option<NodeId>,
    /// Store-assigned creation order, unique per project
    pub seq: u64,
    pub role: TurnRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<SystemEvent>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn build(project_id: &str, node: Option<NodeId>, role: TurnRole, content: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            node,
            seq: 0,
            role,
            event: None,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn learner(project_id: &str, node: NodeId, content: &str) -> Self {
        Self::build(project_id, Some(node), TurnRole::Learner, content)
    }

    pub fn assistant(project_id: &str, node: NodeId, content: &str) -> Self {
        Self::build(project_id, Some(node), TurnRole::Assistant, content)
    }

    pub fn system_event(
        project_id: &str,
        node: Option<NodeId>,
        event: SystemEvent,
        content: &str,
    ) -> Self {
        let mut turn = Self::build(project_id, node, TurnRole::System, content);
        turn.event = Some(event);
        turn
    }
}

/// A form payload submitted on a Node. The latest one is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: Uuid,
    pub project_id: String,
    pub node: NodeId,
    pub data: Value,
    #[serde(default)]
    pub evaluation: Option<EvaluationResult>,
    pub created_at: DateTime<Utc>,
}

impl FormSubmission {
    pub fn new(project_id: &str, node: NodeId, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            node,
            data,
            evaluation: None,
            created_at: Utc::now(),
        }
    }
}

/// Review state of a deliverable version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Draft,
    Submitted,
}

impl std::fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Submitted => write!(f, "submitted"),
        }
    }
}

/// The learner inputs a document was generated from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Transcript rendered with speaker tags
    #[serde(default)]
    pub turns: Vec<String>,
    #[serde(default)]
    pub form_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableContent {
    pub document: String,
    pub source: SourceSnapshot,
}

/// A versioned artifact summarizing a completed Node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: Uuid,
    pub project_id: String,
    pub node: NodeId,
    pub kind: String,
    pub title: String,
    pub content: DeliverableContent,
    /// Starts at 1, increments per Node
    pub version: u32,
    pub status: DeliverableStatus,
    /// Content is the raw-text fallback rather than a generated summary
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deliverable before the store assigns its id and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeliverable {
    pub project_id: String,
    pub node: NodeId,
    pub kind: String,
    pub title: String,
    pub content: DeliverableContent,
    pub degraded: bool,
}

impl NewDeliverable {
    /// Materialize with the given version.
    pub fn into_deliverable(self, version: u32, at: DateTime<Utc>) -> Deliverable {
        Deliverable {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            node: self.node,
            kind: self.kind,
            title: self.title,
            content: self.content,
            version,
            status: DeliverableStatus::Draft,
            degraded: self.degraded,
            created_at: at,
            updated_at: at,
        }
    }
}
