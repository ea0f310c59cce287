//! Progression Engine: the per-Node state machine and its operations
//!
//! ```text
//!  submit_form ─────────────┐
//!  complete_conversation ───┼─▶ criteria ──pass──▶ advance ──▶ Advance::Next / Finished
//!  approve_node ────────────┘      │                  │
//!                                  │ manual_review    ├─ CAS in_progress → completed
//!                                  ▼                  ├─ deliverable (auto_generate)
//!                             needs_review            └─ activate successor, move project
//! ```
//!
//! The engine holds no per-project state. Every mutation that races with
//! another request on the same project goes through a store compare-and-swap,
//! so the engine can be shared behind an `Arc` and called concurrently.

pub mod error;
pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CompletionCriteria, NodeDefinition, NodeId, NodeInput, StepCatalog};
use crate::config::EngineConfig;
use crate::context::{ContextBuilder, PriorOutput, PriorOutputs};
use crate::deliverable::{DeliverableGenerator, NodeInputs};
use crate::evaluator::{EvaluationResult, Evaluator};
use crate::form;
use crate::generation::GenerationService;
use crate::model::{
    CommentAuthor, ConversationTurn, Deliverable, DeliverableContent, DeliverableStatus,
    FormSubmission, LearnerProfile, NewDeliverable, NodeKey, NodeProgressRecord, NodeStatus,
    ProjectProgressState, ProjectStatus, SourceSnapshot, SystemEvent, TurnRole,
};
use crate::store::{ProgressStore, StoreError, Transition};

pub use error::{EngineError, EngineResult};
pub use progress::{ProgressSnapshot, ReviewQueue, StepProgress, StepStatus};

/// Where the learner goes after a Node completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advance {
    /// The next Node, now `in_progress`
    Next { step: u32, node: NodeId },
    /// The curriculum is finished
    Finished,
}

impl std::fmt::Display for Advance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Next { node, .. } => write!(f, "next {}", node),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub passed: bool,
    /// Rubric result, for `ai_evaluation` Nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    /// Set when the Node is (or already was) completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance: Option<Advance>,
    /// The Node is waiting on a teacher
    pub awaiting_review: bool,
}

impl CompletionOutcome {
    fn advanced(evaluation: Option<EvaluationResult>, advance: Advance) -> Self {
        Self {
            passed: true,
            evaluation,
            advance: Some(advance),
            awaiting_review: false,
        }
    }

    fn not_passed(evaluation: Option<EvaluationResult>) -> Self {
        Self {
            passed: false,
            evaluation,
            advance: None,
            awaiting_review: false,
        }
    }

    fn awaiting_review(evaluation: Option<EvaluationResult>) -> Self {
        Self {
            passed: false,
            evaluation,
            advance: None,
            awaiting_review: true,
        }
    }
}

/// Criteria decision before any state change.
enum Verdict {
    Pass(Option<EvaluationResult>),
    Fail(Option<EvaluationResult>),
    Review(Option<EvaluationResult>),
}

/// Orchestrates catalog, store, evaluator and deliverable generator.
pub struct ProgressionEngine {
    catalog: Arc<StepCatalog>,
    store: Arc<dyn ProgressStore>,
    evaluator: Evaluator,
    deliverables: DeliverableGenerator,
    context: ContextBuilder,
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(
        catalog: Arc<StepCatalog>,
        store: Arc<dyn ProgressStore>,
        service: Arc<dyn GenerationService>,
        config: EngineConfig,
    ) -> Self {
        let timeout = config.generation_timeout();
        Self {
            catalog,
            store,
            evaluator: Evaluator::new(service.clone(), config.evaluation, timeout),
            deliverables: DeliverableGenerator::new(service, timeout),
            context: config.context_builder(),
            config,
        }
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context_builder(&self) -> &ContextBuilder {
        &self.context
    }

    // ---- projects ----

    /// Create a project at the first Node. Returns the existing state if the
    /// project was already started.
    pub async fn start_project(
        &self,
        project_id: &str,
        learner: LearnerProfile,
    ) -> EngineResult<ProjectProgressState> {
        let now = Utc::now();
        let first = self.catalog.first_node();
        let state = ProjectProgressState::new(project_id, first, learner, now);
        let record = NodeProgressRecord::started(&NodeKey::new(project_id, first), now);

        if self.store.create_project(state.clone(), record).await? {
            info!(project_id, node = %first, "Project started");
            return Ok(state);
        }

        debug!(project_id, "Project already exists");
        self.load_project(project_id).await
    }

    pub async fn get_progress(&self, project_id: &str) -> EngineResult<ProgressSnapshot> {
        let project = self.load_project(project_id).await?;
        let records = self.store.list_nodes(project_id).await?;
        let deliverables = self.store.list_deliverables(project_id).await?;
        Ok(ProgressSnapshot::build(&self.catalog, project, records, deliverables))
    }

    pub async fn review_queue(&self, project_id: &str) -> EngineResult<ReviewQueue> {
        self.load_project(project_id).await?;
        let records = self.store.list_nodes(project_id).await?;
        let turns = self.store.list_project_turns(project_id).await?;
        Ok(ReviewQueue::build(project_id, records, turns))
    }

    // ---- completion ----

    /// Validate and record a form payload, then apply the Node's criteria.
    pub async fn submit_form(
        &self,
        project_id: &str,
        step: u32,
        node_id: &str,
        data: Value,
    ) -> EngineResult<CompletionOutcome> {
        let node = self.resolve(step, node_id)?;
        let schema = node.form.as_ref().ok_or(EngineError::NoFormSchema(node.id))?;
        let project = self.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        let record = self.reached(&key).await?;

        match record.status {
            NodeStatus::Completed => return self.already_completed(project_id, node.id).await,
            NodeStatus::NeedsReview => {
                return Err(EngineError::InvalidTransition {
                    node: node.id,
                    from: record.status,
                    action: "submit a form for",
                })
            }
            _ => {}
        }

        if let Err(errors) = form::validate(schema, &data) {
            debug!(project_id, node = %node.id, errors = errors.len(), "Form rejected");
            return Err(EngineError::ValidationFailed(errors));
        }

        let submission = FormSubmission::new(project_id, node.id, data);
        self.store.insert_submission(&submission).await?;
        info!(project_id, node = %node.id, submission = %submission.id, "Form recorded");

        let verdict = match node.completion {
            CompletionCriteria::FormComplete => Verdict::Pass(None),
            CompletionCriteria::AiEvaluation { threshold } => {
                let content = render_form(&submission.data);
                let evaluation = self
                    .score(&project, node, &content, threshold)
                    .await;
                self.store
                    .attach_evaluation(project_id, submission.id, &evaluation)
                    .await?;
                judge(evaluation)
            }
            CompletionCriteria::ManualReview => Verdict::Review(None),
        };

        self.settle(project_id, node, verdict).await
    }

    /// The learner says "I'm done" on a conversation Node.
    pub async fn complete_conversation_node(
        &self,
        project_id: &str,
        step: u32,
        node_id: &str,
    ) -> EngineResult<CompletionOutcome> {
        let node = self.resolve(step, node_id)?;
        let project = self.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        let record = self.reached(&key).await?;

        match record.status {
            NodeStatus::Completed => return self.already_completed(project_id, node.id).await,
            NodeStatus::NeedsReview => {
                return Err(EngineError::InvalidTransition {
                    node: node.id,
                    from: record.status,
                    action: "complete",
                })
            }
            _ => {}
        }

        let verdict = match node.completion {
            CompletionCriteria::FormComplete => match &node.form {
                None => Verdict::Pass(None),
                Some(schema) => {
                    let latest = self.store.latest_submission(&key).await?;
                    match latest {
                        Some(sub) if form::validate(schema, &sub.data).is_ok() => Verdict::Pass(None),
                        _ => Verdict::Fail(None),
                    }
                }
            },
            CompletionCriteria::AiEvaluation { threshold } => {
                let transcript = self.store.list_turns(project_id, node.id).await?;
                if !transcript.iter().any(|t| t.role == TurnRole::Learner) {
                    debug!(project_id, node = %node.id, "Nothing to evaluate yet");
                    return Ok(CompletionOutcome::not_passed(None));
                }
                let inputs = NodeInputs {
                    transcript,
                    form_data: None,
                };
                let content = inputs.rendered_turns().join("\n");
                judge(self.score(&project, node, &content, threshold).await)
            }
            CompletionCriteria::ManualReview => Verdict::Review(None),
        };

        self.settle(project_id, node, verdict).await
    }

    /// Teacher completes a Node that is in progress or waiting on review.
    pub async fn approve_node(
        &self,
        project_id: &str,
        step: u32,
        node_id: &str,
    ) -> EngineResult<CompletionOutcome> {
        let node = self.resolve(step, node_id)?;
        self.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        self.reached(&key).await?;

        let advance = self
            .advance(
                project_id,
                node,
                &[NodeStatus::InProgress, NodeStatus::NeedsReview],
            )
            .await?;
        info!(project_id, node = %node.id, "Node approved by teacher");
        Ok(CompletionOutcome::advanced(None, advance))
    }

    // ---- help and feedback ----

    /// Learner asks for a teacher. The Node stays current and waits on review.
    pub async fn request_help(
        &self,
        project_id: &str,
        step: u32,
        node_id: &str,
        reason: &str,
    ) -> EngineResult<NodeProgressRecord> {
        let node = self.resolve(step, node_id)?;
        self.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        self.reached(&key).await?;

        let transition = self
            .store
            .transition_node(&key, &[NodeStatus::InProgress], NodeStatus::NeedsReview, Utc::now())
            .await?;
        let record = match transition {
            Transition::Applied(record) => record,
            Transition::Conflict(Some(record)) if record.status == NodeStatus::NeedsReview => record,
            Transition::Conflict(current) => {
                return Err(EngineError::InvalidTransition {
                    node: node.id,
                    from: current.map(|r| r.status).unwrap_or(NodeStatus::NotStarted),
                    action: "request help on",
                })
            }
        };

        self.store
            .append_turns(vec![ConversationTurn::system_event(
                project_id,
                Some(node.id),
                SystemEvent::HelpRequested,
                reason,
            )])
            .await?;
        info!(project_id, node = %node.id, "Help requested");
        Ok(record)
    }

    /// Teacher feedback, scoped to a Node or to the whole project.
    ///
    /// A Node waiting on review goes back to `in_progress`.
    pub async fn submit_teacher_feedback(
        &self,
        project_id: &str,
        target: Option<(u32, &str)>,
        feedback: &str,
    ) -> EngineResult<Option<NodeProgressRecord>> {
        self.load_project(project_id).await?;

        let Some((step, node_id)) = target else {
            self.store
                .append_turns(vec![ConversationTurn::system_event(
                    project_id,
                    None,
                    SystemEvent::TeacherFeedback,
                    feedback,
                )])
                .await?;
            info!(project_id, "Project feedback recorded");
            return Ok(None);
        };

        let node = self.resolve(step, node_id)?;
        let key = NodeKey::new(project_id, node.id);
        let record = self.reached(&key).await?;

        self.store
            .append_turns(vec![ConversationTurn::system_event(
                project_id,
                Some(node.id),
                SystemEvent::TeacherFeedback,
                feedback,
            )])
            .await?;

        if record.status != NodeStatus::NeedsReview {
            info!(project_id, node = %node.id, "Node feedback recorded");
            return Ok(Some(record));
        }

        let transition = self
            .store
            .transition_node(&key, &[NodeStatus::NeedsReview], NodeStatus::InProgress, Utc::now())
            .await?;
        match transition {
            Transition::Applied(record) => {
                info!(project_id, node = %node.id, "Review resolved, node back in progress");
                Ok(Some(record))
            }
            Transition::Conflict(current) => {
                debug!(project_id, node = %node.id, "Review already resolved");
                Ok(current)
            }
        }
    }

    /// Project-level comment from a parent or teacher.
    pub async fn post_comment(
        &self,
        project_id: &str,
        author: CommentAuthor,
        message: &str,
    ) -> EngineResult<ConversationTurn> {
        self.load_project(project_id).await?;
        let mut stored = self
            .store
            .append_turns(vec![ConversationTurn::system_event(
                project_id,
                None,
                SystemEvent::Comment { author },
                message,
            )])
            .await?;
        info!(project_id, %author, "Comment posted");
        stored
            .pop()
            .ok_or_else(|| StoreError::WriteFailed("comment was not stored".to_string()).into())
    }

    // ---- deliverables ----

    /// Generate a new version of a completed Node's deliverable.
    pub async fn regenerate_deliverable(
        &self,
        project_id: &str,
        step: u32,
        node_id: &str,
    ) -> EngineResult<Deliverable> {
        let node = self.resolve(step, node_id)?;
        if node.deliverable.is_none() {
            return Err(EngineError::NoDeliverableSpec(node.id));
        }
        self.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        let record = self.reached(&key).await?;
        if record.status != NodeStatus::Completed {
            return Err(EngineError::InvalidTransition {
                node: node.id,
                from: record.status,
                action: "regenerate the deliverable of",
            });
        }

        self.generate_deliverable(project_id, node)
            .await?
            .ok_or(EngineError::NoDeliverableSpec(node.id))
    }

    /// Mark a deliverable version as submitted.
    pub async fn submit_deliverable(
        &self,
        project_id: &str,
        deliverable_id: Uuid,
    ) -> EngineResult<Deliverable> {
        self.load_project(project_id).await?;
        let current = self
            .store
            .get_deliverable(project_id, deliverable_id)
            .await?
            .ok_or(EngineError::DeliverableNotFound(deliverable_id))?;
        if current.status == DeliverableStatus::Submitted {
            return Ok(current);
        }

        let updated = self
            .store
            .set_deliverable_status(project_id, deliverable_id, DeliverableStatus::Submitted)
            .await?
            .ok_or(EngineError::DeliverableNotFound(deliverable_id))?;
        info!(
            project_id,
            node = %updated.node,
            version = updated.version,
            "Deliverable submitted"
        );
        Ok(updated)
    }

    // ---- shared with the turn path ----

    /// Look up a catalog Node.
    pub fn resolve(&self, step: u32, node_id: &str) -> EngineResult<&NodeDefinition> {
        self.catalog
            .lookup(step, node_id)
            .ok_or_else(|| EngineError::ConfigNotFound {
                step,
                node: node_id.to_string(),
            })
    }

    pub async fn load_project(&self, project_id: &str) -> EngineResult<ProjectProgressState> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))
    }

    /// The record of a Node the learner has reached.
    pub async fn reached(&self, key: &NodeKey) -> EngineResult<NodeProgressRecord> {
        match self.store.get_node(key).await? {
            Some(record) if record.status != NodeStatus::NotStarted => Ok(record),
            _ => Err(EngineError::NodeNotReached { node: key.node }),
        }
    }

    /// Move an in-progress Node to `needs_review` and leave a system event.
    ///
    /// Returns `false` if the Node was not in progress (already flagged,
    /// completed, or missing).
    pub async fn flag_for_review(
        &self,
        project_id: &str,
        node: NodeId,
        reason: &str,
    ) -> EngineResult<bool> {
        let key = NodeKey::new(project_id, node);
        let transition = self
            .store
            .transition_node(&key, &[NodeStatus::InProgress], NodeStatus::NeedsReview, Utc::now())
            .await?;
        if !transition.is_applied() {
            debug!(project_id, node = %node, "Node not in progress, review flag skipped");
            return Ok(false);
        }

        self.store
            .append_turns(vec![ConversationTurn::system_event(
                project_id,
                Some(node),
                SystemEvent::ReviewRequired,
                reason,
            )])
            .await?;
        warn!(project_id, node = %node, reason, "Node flagged for teacher review");
        Ok(true)
    }

    /// Earlier outputs a Node may draw on: latest deliverable per earlier
    /// Node, plus whatever its declared inputs reference.
    pub async fn prior_outputs(
        &self,
        project_id: &str,
        node: &NodeDefinition,
    ) -> EngineResult<PriorOutputs> {
        let mut latest: BTreeMap<NodeId, Deliverable> = BTreeMap::new();
        for deliverable in self.store.list_deliverables(project_id).await? {
            if deliverable.node >= node.id {
                continue;
            }
            let newer = latest
                .get(&deliverable.node)
                .map_or(true, |d| deliverable.version > d.version);
            if newer {
                latest.insert(deliverable.node, deliverable);
            }
        }

        let mut prior = PriorOutputs {
            summaries: latest
                .into_values()
                .map(|d| PriorOutput {
                    node: d.node,
                    title: d.title,
                    content: d.content.document,
                })
                .collect(),
            ..PriorOutputs::default()
        };

        for input in &node.inputs {
            let source = NodeKey::new(project_id, input.source());
            match input {
                NodeInput::StructuredOutput { from } => {
                    if let Some(sub) = self.store.latest_submission(&source).await? {
                        prior.form_data.insert(*from, sub.data);
                    }
                }
                NodeInput::LearnerMessages { from, .. } => {
                    let messages: Vec<String> = self
                        .store
                        .list_turns(project_id, *from)
                        .await?
                        .into_iter()
                        .filter(|t| t.role == TurnRole::Learner)
                        .map(|t| t.content)
                        .collect();
                    prior.learner_messages.insert(*from, messages);
                }
            }
        }

        Ok(prior)
    }

    // ---- internals ----

    async fn score(
        &self,
        project: &ProjectProgressState,
        node: &NodeDefinition,
        content: &str,
        threshold: Option<f64>,
    ) -> EvaluationResult {
        let threshold = threshold.unwrap_or(self.config.default_threshold);
        let evaluation = self
            .evaluator
            .evaluate(content, &node.rubric, threshold, &project.learner)
            .await;
        info!(
            project_id = %project.project_id,
            node = %node.id,
            score = evaluation.overall_score,
            threshold,
            passed = evaluation.passed,
            "Node evaluated"
        );
        evaluation
    }

    async fn settle(
        &self,
        project_id: &str,
        node: &NodeDefinition,
        verdict: Verdict,
    ) -> EngineResult<CompletionOutcome> {
        match verdict {
            Verdict::Pass(evaluation) => {
                let advance = self
                    .advance(project_id, node, &[NodeStatus::InProgress])
                    .await?;
                Ok(CompletionOutcome::advanced(evaluation, advance))
            }
            Verdict::Fail(evaluation) => {
                debug!(project_id, node = %node.id, "Completion criteria not met");
                Ok(CompletionOutcome::not_passed(evaluation))
            }
            Verdict::Review(evaluation) => {
                let reason = match &evaluation {
                    Some(_) => "Rubric scoring was unavailable; a teacher needs to review this work.",
                    None => "This node is completed by teacher review.",
                };
                self.flag_for_review(project_id, node.id, reason).await?;
                Ok(CompletionOutcome::awaiting_review(evaluation))
            }
        }
    }

    /// Complete `node` and move the project forward.
    ///
    /// Only the caller whose compare-and-swap lands generates the deliverable.
    /// A caller that finds the Node already completed re-runs
    /// [`Self::follow_through`], which repairs a project left behind by a
    /// failed write and otherwise changes nothing.
    async fn advance(
        &self,
        project_id: &str,
        node: &NodeDefinition,
        from: &[NodeStatus],
    ) -> EngineResult<Advance> {
        let key = NodeKey::new(project_id, node.id);
        let now = Utc::now();

        match self
            .store
            .transition_node(&key, from, NodeStatus::Completed, now)
            .await?
        {
            Transition::Applied(_) => {
                info!(project_id, step = node.id.step, node = %node.id, "Node completed");
            }
            Transition::Conflict(Some(record)) if record.status == NodeStatus::Completed => {
                warn!(project_id, node = %node.id, "Node already completed, returning successor");
                return self.follow_through(project_id, node.id, now).await;
            }
            Transition::Conflict(current) => {
                return Err(EngineError::InvalidTransition {
                    node: node.id,
                    from: current.map(|r| r.status).unwrap_or(NodeStatus::NotStarted),
                    action: "complete",
                });
            }
        }

        if node.auto_generates() {
            self.generate_deliverable(project_id, node).await?;
        }

        self.follow_through(project_id, node.id, now).await
    }

    /// Activate the successor of a completed `node` and move the project
    /// pointer onto it.
    ///
    /// Repeatable: activation leaves an existing record alone and the pointer
    /// only moves forward.
    async fn follow_through(
        &self,
        project_id: &str,
        node: NodeId,
        now: DateTime<Utc>,
    ) -> EngineResult<Advance> {
        let advance = self.successor(node);
        if let Advance::Next { node: next, .. } = advance {
            self.store
                .activate_node(&NodeKey::new(project_id, next), now)
                .await?;
        }

        let mut project = self.load_project(project_id).await?;
        if project.status == ProjectStatus::Completed || project.current_node > node {
            return Ok(advance);
        }
        match advance {
            Advance::Next { step, node: next } => {
                project.current_step = step;
                project.current_node = next;
                info!(project_id, step, node = %next, "Advanced to next node");
            }
            Advance::Finished => {
                project.status = ProjectStatus::Completed;
                info!(project_id, "Curriculum finished");
            }
        }
        project.updated_at = now;
        self.store.put_project(&project).await?;

        Ok(advance)
    }

    fn successor(&self, node: NodeId) -> Advance {
        match self.catalog.successor(node) {
            Some(next) => Advance::Next {
                step: next.step,
                node: next,
            },
            None => Advance::Finished,
        }
    }

    async fn already_completed(&self, project_id: &str, node: NodeId) -> EngineResult<CompletionOutcome> {
        debug!(project_id, node = %node, "Completion repeated on a completed node");
        let advance = self.follow_through(project_id, node, Utc::now()).await?;
        Ok(CompletionOutcome::advanced(None, advance))
    }

    async fn node_inputs(&self, project_id: &str, node: NodeId) -> EngineResult<NodeInputs> {
        let key = NodeKey::new(project_id, node);
        Ok(NodeInputs {
            transcript: self.store.list_turns(project_id, node).await?,
            form_data: self.store.latest_submission(&key).await?.map(|s| s.data),
        })
    }

    /// Generate and persist the next deliverable version. `None` if the Node
    /// declares no deliverable.
    async fn generate_deliverable(
        &self,
        project_id: &str,
        node: &NodeDefinition,
    ) -> EngineResult<Option<Deliverable>> {
        let Some(spec) = &node.deliverable else {
            return Ok(None);
        };

        let inputs = self.node_inputs(project_id, node.id).await?;
        let document = self.deliverables.generate(&inputs, &spec.purpose).await;
        let stored = self
            .store
            .insert_deliverable(NewDeliverable {
                project_id: project_id.to_string(),
                node: node.id,
                kind: spec.kind.clone(),
                title: node.title.clone(),
                content: DeliverableContent {
                    document: document.text,
                    source: SourceSnapshot {
                        turns: inputs.rendered_turns(),
                        form_data: inputs.form_data,
                    },
                },
                degraded: document.degraded,
            })
            .await?;

        info!(
            project_id,
            node = %node.id,
            kind = %stored.kind,
            version = stored.version,
            degraded = stored.degraded,
            "Deliverable stored"
        );
        Ok(Some(stored))
    }
}

fn judge(evaluation: EvaluationResult) -> Verdict {
    if evaluation.needs_review() {
        Verdict::Review(Some(evaluation))
    } else if evaluation.passed {
        Verdict::Pass(Some(evaluation))
    } else {
        Verdict::Fail(Some(evaluation))
    }
}

fn render_form(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}
