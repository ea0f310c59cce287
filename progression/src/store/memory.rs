//! In-memory [`ProgressStore`]
//!
//! A single `RwLock` guards all maps, so every trait call is atomic and the
//! compare-and-swap operations need no extra coordination.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{apply_status, ProgressStore, StoreError, StoreResult, Transition};
use crate::catalog::NodeId;
use crate::evaluator::EvaluationResult;
use crate::model::{
    ConversationTurn, Deliverable, DeliverableStatus, FormSubmission, NewDeliverable, NodeKey,
    NodeProgressRecord, NodeStatus, ProjectProgressState,
};

#[derive(Default)]
struct Inner {
    projects: HashMap<String, ProjectProgressState>,
    nodes: BTreeMap<(String, NodeId), NodeProgressRecord>,
    turns: Vec<ConversationTurn>,
    next_seq: HashMap<String, u64>,
    submissions: Vec<FormSubmission>,
    deliverables: Vec<Deliverable>,
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with [`StoreError::WriteFailed`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("writes disabled".to_string()));
        }
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

fn node_key(key: &NodeKey) -> (String, NodeId) {
    (key.project_id.clone(), key.node)
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn create_project(
        &self,
        state: ProjectProgressState,
        first: NodeProgressRecord,
    ) -> StoreResult<bool> {
        let mut inner = self.write()?;
        if inner.projects.contains_key(&state.project_id) {
            return Ok(false);
        }
        inner
            .nodes
            .insert((first.project_id.clone(), first.node), first);
        inner.projects.insert(state.project_id.clone(), state);
        Ok(true)
    }

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<ProjectProgressState>> {
        Ok(self.read()?.projects.get(project_id).cloned())
    }

    async fn put_project(&self, state: &ProjectProgressState) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner
            .projects
            .insert(state.project_id.clone(), state.clone());
        Ok(())
    }

    async fn get_node(&self, key: &NodeKey) -> StoreResult<Option<NodeProgressRecord>> {
        Ok(self.read()?.nodes.get(&node_key(key)).cloned())
    }

    async fn list_nodes(&self, project_id: &str) -> StoreResult<Vec<NodeProgressRecord>> {
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn activate_node(&self, key: &NodeKey, at: DateTime<Utc>) -> StoreResult<NodeProgressRecord> {
        let mut inner = self.write()?;
        let record = inner
            .nodes
            .entry(node_key(key))
            .or_insert_with(|| NodeProgressRecord::started(key, at));
        if record.status == NodeStatus::NotStarted {
            apply_status(record, NodeStatus::InProgress, at);
        }
        Ok(record.clone())
    }

    async fn transition_node(
        &self,
        key: &NodeKey,
        from: &[NodeStatus],
        to: NodeStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        let mut inner = self.write()?;
        let Some(record) = inner.nodes.get_mut(&node_key(key)) else {
            return Ok(Transition::Conflict(None));
        };
        if !from.contains(&record.status) {
            return Ok(Transition::Conflict(Some(record.clone())));
        }
        apply_status(record, to, at);
        Ok(Transition::Applied(record.clone()))
    }

    async fn set_hint_level(&self, key: &NodeKey, expected: u32, level: u32) -> StoreResult<bool> {
        let mut inner = self.write()?;
        match inner.nodes.get_mut(&node_key(key)) {
            Some(record) if record.hint_level == expected => {
                record.hint_level = level;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_turns(&self, turns: Vec<ConversationTurn>) -> StoreResult<Vec<ConversationTurn>> {
        let mut inner = self.write()?;
        let mut stored = Vec::with_capacity(turns.len());
        for mut turn in turns {
            let seq = inner.next_seq.entry(turn.project_id.clone()).or_insert(0);
            *seq += 1;
            turn.seq = *seq;
            inner.turns.push(turn.clone());
            stored.push(turn);
        }
        Ok(stored)
    }

    async fn list_turns(&self, project_id: &str, node: NodeId) -> StoreResult<Vec<ConversationTurn>> {
        Ok(self
            .read()?
            .turns
            .iter()
            .filter(|t| t.project_id == project_id && t.node == Some(node))
            .cloned()
            .collect())
    }

    async fn list_project_turns(&self, project_id: &str) -> StoreResult<Vec<ConversationTurn>> {
        Ok(self
            .read()?
            .turns
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_submission(&self, submission: &FormSubmission) -> StoreResult<()> {
        self.write()?.submissions.push(submission.clone());
        Ok(())
    }

    async fn attach_evaluation(
        &self,
        project_id: &str,
        submission_id: Uuid,
        evaluation: &EvaluationResult,
    ) -> StoreResult<()> {
        let mut inner = self.write()?;
        let submission = inner
            .submissions
            .iter_mut()
            .find(|s| s.project_id == project_id && s.id == submission_id)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", submission_id)))?;
        submission.evaluation = Some(evaluation.clone());
        Ok(())
    }

    async fn latest_submission(&self, key: &NodeKey) -> StoreResult<Option<FormSubmission>> {
        Ok(self
            .read()?
            .submissions
            .iter()
            .rev()
            .find(|s| s.project_id == key.project_id && s.node == key.node)
            .cloned())
    }

    async fn list_submissions(&self, project_id: &str) -> StoreResult<Vec<FormSubmission>> {
        Ok(self
            .read()?
            .submissions
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_deliverable(&self, deliverable: NewDeliverable) -> StoreResult<Deliverable> {
        let mut inner = self.write()?;
        let version = inner
            .deliverables
            .iter()
            .filter(|d| d.project_id == deliverable.project_id && d.node == deliverable.node)
            .map(|d| d.version)
            .max()
            .unwrap_or(0)
            + 1;
        let stored = deliverable.into_deliverable(version, Utc::now());
        inner.deliverables.push(stored.clone());
        Ok(stored)
    }

    async fn list_deliverables(&self, project_id: &str) -> StoreResult<Vec<Deliverable>> {
        let mut list: Vec<Deliverable> = self
            .read()?
            .deliverables
            .iter()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        list.sort_by_key(|d| (d.node, d.version));
        Ok(list)
    }

    async fn get_deliverable(&self, project_id: &str, id: Uuid) -> StoreResult<Option<Deliverable>> {
        Ok(self
            .read()?
            .deliverables
            .iter()
            .find(|d| d.project_id == project_id && d.id == id)
            .cloned())
    }

    async fn set_deliverable_status(
        &self,
        project_id: &str,
        id: Uuid,
        status: DeliverableStatus,
    ) -> StoreResult<Option<Deliverable>> {
        let mut inner = self.write()?;
        Ok(inner
            .deliverables
            .iter_mut()
            .find(|d| d.project_id == project_id && d.id == id)
            .map(|d| {
                d.status = status;
                d.updated_at = Utc::now();
                d.clone()
            }))
    }
}
