//! Integration tests for the progression engine
//!
//! Drives projects through the built-in curriculum with an in-memory store
//! and a scripted generation service, covering advancement, idempotence,
//! concurrent completion, threshold gating, review and deliverables.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progression::{
    Advance, CompletionCriteria, ConversationTurn, Deliverable, DeliverableStatus, EngineConfig,
    EngineError, EvaluationResult, FieldKind, FormField, FormSubmission, HintThresholds,
    LearnerProfile, MemoryStore, NewDeliverable, NodeId, NodeKey, NodeProgressRecord, NodeStatus,
    ProgressStore, ProgressionEngine, ProjectProgressState, ProjectStatus, ScriptedGenerator,
    StepCatalog, StepStatus, StoreError, StoreResult, Transition,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// Scoring reply with a single dimension, averaged over the rubric.
fn score(value: f64) -> String {
    format!(
        r#"Here is my assessment:
{{"dimensions": [{{"dimension": "overall", "score": {}, "feedback": "ok"}}], "summary": "Scored."}}"#,
        value
    )
}

fn fill_fields(fields: &[FormField]) -> Value {
    let mut map = serde_json::Map::new();
    for field in fields {
        let value = match field.kind {
            FieldKind::Text | FieldKind::Textarea => json!(format!("my {}", field.name)),
            FieldKind::Select => json!(field.options.first().cloned().unwrap_or_default()),
            FieldKind::Number => json!(3),
            FieldKind::Array => {
                let count = field.min_items.unwrap_or(1).max(1);
                Value::Array((0..count).map(|_| fill_fields(&field.item_fields)).collect())
            }
        };
        map.insert(field.name.clone(), value);
    }
    Value::Object(map)
}

fn observations(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "scene": format!("bus stop {}", i),
                "who": "students",
                "problem": "the bus is late",
                "current_solution": "walking"
            })
        })
        .collect();
    json!({ "observations": items })
}

struct Harness {
    engine: Arc<ProgressionEngine>,
    store: Arc<MemoryStore>,
    service: Arc<ScriptedGenerator>,
}

fn harness_with(catalog: StepCatalog, service: ScriptedGenerator, config: EngineConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("progression=debug")
        .with_test_writer()
        .try_init();
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(service);
    let engine = ProgressionEngine::new(Arc::new(catalog), store.clone(), service.clone(), config);
    Harness {
        engine: Arc::new(engine),
        store,
        service,
    }
}

fn harness(service: ScriptedGenerator) -> Harness {
    let catalog = StepCatalog::builtin(&HintThresholds::default()).unwrap();
    harness_with(catalog, service, EngineConfig::default())
}

async fn say(h: &Harness, project: &str, node: NodeId, message: &str) {
    use progression::ProgressStore;
    h.store
        .append_turns(vec![
            ConversationTurn::learner(project, node, message),
            ConversationTurn::assistant(project, node, "Tell me more."),
        ])
        .await
        .unwrap();
}

/// Complete whatever Node the project is on, the way a learner would.
async fn complete_current(h: &Harness, project: &str) -> progression::CompletionOutcome {
    let state = h.engine.load_project(project).await.unwrap();
    let node = h.engine.catalog().node(state.current_node).unwrap().clone();
    let id = node.id.to_string();
    match &node.form {
        Some(schema) => h
            .engine
            .submit_form(project, node.id.step, &id, fill_fields(&schema.fields))
            .await
            .unwrap(),
        None => {
            say(h, project, node.id, "I noticed the school bus is always late").await;
            h.engine
                .complete_conversation_node(project, node.id.step, &id)
                .await
                .unwrap()
        }
    }
}

/// Test: Walking every Node finishes the project exactly once, in order
#[tokio::test]
async fn test_full_walkthrough_finishes_after_every_node() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::with_grade(6)).await.unwrap();

    let order: Vec<NodeId> = h.engine.catalog().nodes().map(|n| n.id).collect();
    assert_eq!(order.len(), 12);

    for (i, expected) in order.iter().enumerate() {
        let state = h.engine.load_project("p").await.unwrap();
        assert_eq!(state.current_node, *expected, "node {} visited out of order", i);
        assert_eq!(state.status, ProjectStatus::Active);

        let outcome = complete_current(&h, "p").await;
        assert!(outcome.passed, "node {} did not pass", expected);
        let advance = outcome.advance.unwrap();
        match order.get(i + 1) {
            Some(next) => assert_eq!(
                advance,
                Advance::Next {
                    step: next.step,
                    node: *next
                }
            ),
            None => assert_eq!(advance, Advance::Finished),
        }
    }

    let progress = h.engine.get_progress("p").await.unwrap();
    assert_eq!(progress.project.status, ProjectStatus::Completed);
    assert_eq!(progress.completed_nodes, 12);
    assert!(progress
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed));

    // One deliverable per auto-generating Node, never more.
    let auto = h.engine.catalog().nodes().filter(|n| n.auto_generates()).count();
    assert_eq!(progress.deliverables.len(), auto);
}

/// Test: A Node ahead of the current one cannot be completed
#[tokio::test]
async fn test_cannot_skip_ahead() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();

    let err = h
        .engine
        .complete_conversation_node("p", 2, "2.1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NodeNotReached { .. }));

    let err = h
        .engine
        .submit_form("p", 2, "2.2", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NodeNotReached { .. }));

    let state = h.engine.load_project("p").await.unwrap();
    assert_eq!(state.current_node, NodeId::new(1, 1));
}

/// Test: Completing the same Node twice returns the same successor without a second advance
#[tokio::test]
async fn test_double_completion_is_idempotent() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    say(&h, "p", NodeId::new(1, 2), "The bus problem matters most").await;

    let first = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();
    let calls_after_first = h.service.call_count();
    let second = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();

    assert_eq!(first.advance, second.advance);
    assert_eq!(
        second.advance,
        Some(Advance::Next {
            step: 1,
            node: NodeId::new(1, 3)
        })
    );
    assert_eq!(h.service.call_count(), calls_after_first, "no second evaluation");

    let state = h.engine.load_project("p").await.unwrap();
    assert_eq!(state.current_node, NodeId::new(1, 3));
    let progress = h.engine.get_progress("p").await.unwrap();
    let for_node: Vec<_> = progress
        .deliverables
        .iter()
        .filter(|d| d.node == NodeId::new(1, 2))
        .collect();
    assert_eq!(for_node.len(), 1);
}

/// Test: Two simultaneous completions produce exactly one transition
#[tokio::test]
async fn test_concurrent_completion_single_transition() {
    let h = harness(
        ScriptedGenerator::constant(score(0.9)).with_delay(Duration::from_millis(10)),
    );
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    say(&h, "p", NodeId::new(1, 2), "The bus problem matters most").await;

    let (a, b) = tokio::join!(
        h.engine.complete_conversation_node("p", 1, "1.2"),
        h.engine.complete_conversation_node("p", 1, "1.2"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.passed && b.passed);
    assert_eq!(a.advance, b.advance);

    let progress = h.engine.get_progress("p").await.unwrap();
    let deliverables: Vec<_> = progress
        .deliverables
        .iter()
        .filter(|d| d.node == NodeId::new(1, 2))
        .collect();
    assert_eq!(deliverables.len(), 1, "only the winner generates");
    assert_eq!(progress.project.current_node, NodeId::new(1, 3));
}

/// Test: Two observations are rejected with a path, three are accepted
#[tokio::test]
async fn test_observation_count_gates_first_node() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();

    match h.engine.submit_form("p", 1, "1.1", observations(2)).await {
        Err(EngineError::ValidationFailed(errors)) => {
            assert!(errors.iter().any(|e| e.path == "observations"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    let record = h
        .engine
        .reached(&NodeKey::new("p", NodeId::new(1, 1)))
        .await
        .unwrap();
    assert_eq!(record.status, NodeStatus::InProgress);

    let outcome = h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    assert!(outcome.passed);
    assert!(outcome.evaluation.is_none());
}

/// Test: 0.55 stays on the Node, 0.6 passes at the inclusive threshold
#[tokio::test]
async fn test_threshold_is_inclusive() {
    let h = harness(ScriptedGenerator::new([score(0.55), score(0.6)]).with_fallback("Chosen problem"));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    say(&h, "p", NodeId::new(1, 2), "The bus, because everyone is late").await;

    let low = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();
    assert!(!low.passed);
    assert_eq!(low.evaluation.as_ref().unwrap().overall_score, 0.55);
    assert!(low.advance.is_none());
    let state = h.engine.load_project("p").await.unwrap();
    assert_eq!(state.current_node, NodeId::new(1, 2));

    let ok = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();
    assert!(ok.passed);
    assert_eq!(ok.evaluation.as_ref().unwrap().overall_score, 0.6);
}

/// Test: With no scoring backend the default policy passes at the threshold
#[tokio::test]
async fn test_unavailable_scoring_fails_open_by_default() {
    let h = harness(ScriptedGenerator::failing());
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    say(&h, "p", NodeId::new(1, 2), "Buses").await;

    let outcome = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();
    assert!(outcome.passed);
    let evaluation = outcome.evaluation.unwrap();
    assert!(evaluation.fallback.is_some());
    assert_eq!(evaluation.overall_score, 0.6);

    // The deliverable falls back to the learner's own words.
    let progress = h.engine.get_progress("p").await.unwrap();
    let doc = &progress.deliverables[0];
    assert!(doc.degraded);
    assert_eq!(doc.content.document, "Buses");
}

/// Test: The manual-review fallback hands the Node to a teacher
#[tokio::test]
async fn test_manual_review_fallback_waits_for_approval() {
    let mut config = EngineConfig::default();
    config.evaluation.on_unavailable = progression::FallbackMode::ManualReview;
    let catalog = StepCatalog::builtin(&config.hints).unwrap();
    let h = harness_with(catalog, ScriptedGenerator::failing(), config);
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    say(&h, "p", NodeId::new(1, 2), "Buses").await;

    let outcome = h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();
    assert!(!outcome.passed);
    assert!(outcome.awaiting_review);

    let queue = h.engine.review_queue("p").await.unwrap();
    assert_eq!(queue.pending.len(), 1);
    assert_eq!(queue.pending[0].node, NodeId::new(1, 2));

    // The learner cannot complete it while it waits.
    let err = h
        .engine
        .complete_conversation_node("p", 1, "1.2")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { from: NodeStatus::NeedsReview, .. }));

    let approved = h.engine.approve_node("p", 1, "1.2").await.unwrap();
    assert_eq!(
        approved.advance,
        Some(Advance::Next {
            step: 1,
            node: NodeId::new(1, 3)
        })
    );
    assert!(h.engine.review_queue("p").await.unwrap().is_empty());
}

/// Test: A manual-review Node never auto-passes
#[tokio::test]
async fn test_manual_review_node_requires_teacher() {
    let source = r#"
        [[steps]]
        step_number = 1
        title = "Pitch"
        description = "Present the idea"

        [[steps.nodes]]
        id = "1.1"
        title = "Practice pitch"
        kind = "conversation"
        guidance = "Help the learner rehearse."
        completion = { kind = "manual_review" }
    "#;
    let catalog = StepCatalog::from_toml_str(source, &HintThresholds::default()).unwrap();
    assert_eq!(
        catalog.node(NodeId::new(1, 1)).unwrap().completion,
        CompletionCriteria::ManualReview
    );
    let h = harness_with(catalog, ScriptedGenerator::constant(score(1.0)), EngineConfig::default());
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    say(&h, "p", NodeId::new(1, 1), "Here is my pitch").await;

    let outcome = h.engine.complete_conversation_node("p", 1, "1.1").await.unwrap();
    assert!(outcome.awaiting_review);
    assert_eq!(h.service.call_count(), 0, "no scoring for manual review");

    let approved = h.engine.approve_node("p", 1, "1.1").await.unwrap();
    assert_eq!(approved.advance, Some(Advance::Finished));
    let state = h.engine.load_project("p").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Completed);
}

/// Test: Regenerating a deliverable adds a version; submitting marks it
#[tokio::test]
async fn test_deliverable_versions_and_submission() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();

    // Not completed yet.
    let err = h
        .engine
        .regenerate_deliverable("p", 1, "1.2")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    say(&h, "p", NodeId::new(1, 2), "The bus").await;
    h.engine.complete_conversation_node("p", 1, "1.2").await.unwrap();

    let second = h.engine.regenerate_deliverable("p", 1, "1.2").await.unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.content.source.turns[0], "Learner: The bus");

    let submitted = h.engine.submit_deliverable("p", second.id).await.unwrap();
    assert_eq!(submitted.status, progression::DeliverableStatus::Submitted);

    let missing = uuid::Uuid::new_v4();
    let err = h.engine.submit_deliverable("p", missing).await.unwrap_err();
    assert!(matches!(err, EngineError::DeliverableNotFound(id) if id == missing));
}

/// Test: A later Node's prompt carries the earlier form answers
#[tokio::test]
async fn test_structured_output_carried_into_next_node() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();
    h.engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();

    let node = h.engine.resolve(1, "1.2").unwrap();
    let prior = h.engine.prior_outputs("p", node).await.unwrap();
    let carried = prior.resolve(&node.inputs[0]).unwrap();
    assert!(carried.contains("bus stop 2"));
}

/// Test: A failed write is reported and nothing advances
#[tokio::test]
async fn test_persistence_failure_propagates() {
    let h = harness(ScriptedGenerator::constant(score(0.9)));
    h.engine.start_project("p", LearnerProfile::default()).await.unwrap();

    h.store.set_fail_writes(true);
    let err = h
        .engine
        .submit_form("p", 1, "1.1", observations(3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(!err.is_client_error());

    h.store.set_fail_writes(false);
    let state = h.engine.load_project("p").await.unwrap();
    assert_eq!(state.current_node, NodeId::new(1, 1));
}

/// Memory store whose next `n` successor activations fail.
struct FlakyActivation {
    inner: MemoryStore,
    failures: AtomicU32,
}

impl FlakyActivation {
    fn failing(n: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl ProgressStore for FlakyActivation {
    async fn create_project(
        &self,
        state: ProjectProgressState,
        first: NodeProgressRecord,
    ) -> StoreResult<bool> {
        self.inner.create_project(state, first).await
    }

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<ProjectProgressState>> {
        self.inner.get_project(project_id).await
    }

    async fn put_project(&self, state: &ProjectProgressState) -> StoreResult<()> {
        self.inner.put_project(state).await
    }

    async fn get_node(&self, key: &NodeKey) -> StoreResult<Option<NodeProgressRecord>> {
        self.inner.get_node(key).await
    }

    async fn list_nodes(&self, project_id: &str) -> StoreResult<Vec<NodeProgressRecord>> {
        self.inner.list_nodes(project_id).await
    }

    async fn activate_node(&self, key: &NodeKey, at: DateTime<Utc>) -> StoreResult<NodeProgressRecord> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::WriteFailed("transient".to_string()));
        }
        self.inner.activate_node(key, at).await
    }

    async fn transition_node(
        &self,
        key: &NodeKey,
        from: &[NodeStatus],
        to: NodeStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        self.inner.transition_node(key, from, to, at).await
    }

    async fn set_hint_level(&self, key: &NodeKey, expected: u32, level: u32) -> StoreResult<bool> {
        self.inner.set_hint_level(key, expected, level).await
    }

    async fn append_turns(&self, turns: Vec<ConversationTurn>) -> StoreResult<Vec<ConversationTurn>> {
        self.inner.append_turns(turns).await
    }

    async fn list_turns(&self, project_id: &str, node: NodeId) -> StoreResult<Vec<ConversationTurn>> {
        self.inner.list_turns(project_id, node).await
    }

    async fn list_project_turns(&self, project_id: &str) -> StoreResult<Vec<ConversationTurn>> {
        self.inner.list_project_turns(project_id).await
    }

    async fn insert_submission(&self, submission: &FormSubmission) -> StoreResult<()> {
        self.inner.insert_submission(submission).await
    }

    async fn attach_evaluation(
        &self,
        project_id: &str,
        submission_id: Uuid,
        evaluation: &EvaluationResult,
    ) -> StoreResult<()> {
        self.inner
            .attach_evaluation(project_id, submission_id, evaluation)
            .await
    }

    async fn latest_submission(&self, key: &NodeKey) -> StoreResult<Option<FormSubmission>> {
        self.inner.latest_submission(key).await
    }

    async fn list_submissions(&self, project_id: &str) -> StoreResult<Vec<FormSubmission>> {
        self.inner.list_submissions(project_id).await
    }

    async fn insert_deliverable(&self, deliverable: NewDeliverable) -> StoreResult<Deliverable> {
        self.inner.insert_deliverable(deliverable).await
    }

    async fn list_deliverables(&self, project_id: &str) -> StoreResult<Vec<Deliverable>> {
        self.inner.list_deliverables(project_id).await
    }

    async fn get_deliverable(&self, project_id: &str, id: Uuid) -> StoreResult<Option<Deliverable>> {
        self.inner.get_deliverable(project_id, id).await
    }

    async fn set_deliverable_status(
        &self,
        project_id: &str,
        id: Uuid,
        status: DeliverableStatus,
    ) -> StoreResult<Option<Deliverable>> {
        self.inner.set_deliverable_status(project_id, id, status).await
    }
}

/// Test: A write failing after the Node completed is reported, and the
/// retry activates the successor instead of stranding the project
#[tokio::test]
async fn test_retry_after_partial_advance_activates_successor() {
    let config = EngineConfig::default();
    let catalog = Arc::new(StepCatalog::builtin(&config.hints).unwrap());
    let store = Arc::new(FlakyActivation::failing(1));
    let service = Arc::new(ScriptedGenerator::constant(score(0.9)));
    let engine = ProgressionEngine::new(catalog, store.clone(), service, config);
    engine.start_project("p", LearnerProfile::default()).await.unwrap();

    let err = engine
        .submit_form("p", 1, "1.1", observations(3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    let node = store.get_node(&NodeKey::new("p", NodeId::new(1, 1))).await.unwrap().unwrap();
    assert_eq!(node.status, NodeStatus::Completed);
    assert!(store.get_node(&NodeKey::new("p", NodeId::new(1, 2))).await.unwrap().is_none());

    let retry = engine.submit_form("p", 1, "1.1", observations(3)).await.unwrap();
    assert!(retry.passed);
    assert_eq!(
        retry.advance,
        Some(Advance::Next {
            step: 1,
            node: NodeId::new(1, 2)
        })
    );

    let state = engine.load_project("p").await.unwrap();
    assert_eq!(state.current_node, NodeId::new(1, 2));
    let next = store.get_node(&NodeKey::new("p", NodeId::new(1, 2))).await.unwrap().unwrap();
    assert_eq!(next.status, NodeStatus::InProgress);
    assert!(engine.reached(&NodeKey::new("p", NodeId::new(1, 2))).await.is_ok());
}
