//! Read-only views: progress snapshot and teacher review queue

use serde::{Deserialize, Serialize};

use crate::catalog::StepCatalog;
use crate::model::{
    ConversationTurn, Deliverable, NodeProgressRecord, NodeStatus, ProjectProgressState, TurnRole,
};

/// Derived status of a Step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Ahead of the project's current step
    Locked,
    NotStarted,
    InProgress,
    /// Every Node of the step is completed
    Completed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One Step in a progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step_number: u32,
    pub title: String,
    pub status: StepStatus,
    /// Records of the Nodes reached so far, in curriculum order
    pub nodes: Vec<NodeProgressRecord>,
    /// Nodes the step declares
    pub total_nodes: usize,
}

/// Everything a learner-facing view needs about a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub project: ProjectProgressState,
    pub steps: Vec<StepProgress>,
    pub deliverables: Vec<Deliverable>,
    pub completed_nodes: usize,
    pub total_nodes: usize,
}

impl ProgressSnapshot {
    pub(crate) fn build(
        catalog: &StepCatalog,
        project: ProjectProgressState,
        records: Vec<NodeProgressRecord>,
        deliverables: Vec<Deliverable>,
    ) -> Self {
        let steps = catalog
            .steps()
            .iter()
            .map(|step| {
                let nodes: Vec<NodeProgressRecord> = records
                    .iter()
                    .filter(|r| r.node.step == step.step_number)
                    .cloned()
                    .collect();
                let completed = nodes
                    .iter()
                    .filter(|r| r.status == NodeStatus::Completed)
                    .count();

                let status = if completed == step.nodes.len() {
                    StepStatus::Completed
                } else if step.step_number > project.current_step {
                    StepStatus::Locked
                } else if nodes.iter().any(|r| r.status != NodeStatus::NotStarted) {
                    StepStatus::InProgress
                } else {
                    StepStatus::NotStarted
                };

                StepProgress {
                    step_number: step.step_number,
                    title: step.title.clone(),
                    status,
                    nodes,
                    total_nodes: step.nodes.len(),
                }
            })
            .collect();

        let completed_nodes = records
            .iter()
            .filter(|r| r.status == NodeStatus::Completed)
            .count();

        Self {
            project,
            steps,
            deliverables,
            completed_nodes,
            total_nodes: catalog.total_nodes(),
        }
    }
}

/// What a teacher needs to look at in one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQueue {
    pub project_id: String,
    /// Nodes waiting on a teacher
    pub pending: Vec<NodeProgressRecord>,
    /// Help requests, feedback, comments and review flags, oldest first
    pub events: Vec<ConversationTurn>,
}

impl ReviewQueue {
    pub(crate) fn build(
        project_id: &str,
        records: Vec<NodeProgressRecord>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            project_id: project_id.to_string(),
            pending: records
                .into_iter()
                .filter(|r| r.status == NodeStatus::NeedsReview)
                .collect(),
            events: turns
                .into_iter()
                .filter(|t| t.role == TurnRole::System && t.event.is_some())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
