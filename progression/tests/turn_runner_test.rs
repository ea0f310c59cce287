//! Integration tests for the conversational turn path
//!
//! Hint escalation over stalled conversations, streaming, cancellation,
//! timeouts and history compaction.

use std::sync::Arc;
use std::time::Duration;

use progression::{
    EngineConfig, GenerationError, HintKind, HintThresholds, LearnerProfile, MemoryStore,
    MessageRole, NodeId, NodeKey, NodeStatus, ProgressStore, ProgressionEngine,
    ScriptedGenerator, StepCatalog, SystemEvent, TurnError, TurnRequest, TurnRole, TurnRunner,
};
use tokio::sync::mpsc;

const CATALOG: &str = r#"
[[steps]]
step_number = 1
title = "Discover"
description = "Find a problem worth solving"

[[steps.nodes]]
id = "1.1"
title = "Talk it through"
kind = "conversation"
guidance = "Help the learner describe a problem from daily life."
completion = { kind = "ai_evaluation", threshold = 0.6 }

[[steps.nodes.rubric]]
dimension = "specificity"
description = "Names a concrete scene"
weight = 1.0

[[steps.nodes.hints]]
level = 1
kind = "nudge"
content = "Think about your trip to school."

[[steps.nodes.hints]]
level = 2
kind = "example"
content = "One student noticed the lunch line was too slow."

[[steps.nodes.hints]]
level = 3
kind = "escalate"
content = "Ask a teacher to sit with the learner."

[[steps.nodes]]
id = "1.2"
title = "Pick one"
kind = "conversation"
guidance = "Help the learner choose."
completion = { kind = "ai_evaluation" }

[[steps.nodes.rubric]]
dimension = "reasoning"
description = "Explains the choice"
weight = 1.0
"#;

struct Harness {
    runner: TurnRunner,
    store: Arc<MemoryStore>,
    service: Arc<ScriptedGenerator>,
}

fn harness(service: ScriptedGenerator, config: EngineConfig) -> Harness {
    let catalog = StepCatalog::from_toml_str(CATALOG, &config.hints).unwrap();
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(service);
    let engine = ProgressionEngine::new(Arc::new(catalog), store.clone(), service.clone(), config);
    Harness {
        runner: TurnRunner::new(Arc::new(engine), service.clone()),
        store,
        service,
    }
}

async fn turn(h: &Harness, message: &str) -> Result<progression::TurnReply, TurnError> {
    let (tx, mut rx) = mpsc::channel(64);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let result = h
        .runner
        .run_turn(TurnRequest::new("p", 1, "1.1", message), tx)
        .await;
    drain.await.unwrap();
    result
}

async fn node_record(h: &Harness) -> progression::NodeProgressRecord {
    h.store
        .get_node(&NodeKey::new("p", NodeId::new(1, 1)))
        .await
        .unwrap()
        .unwrap()
}

/// Test: Hints fire on the 4th and 8th learner turns and not in between
#[tokio::test]
async fn test_hints_fire_at_four_and_eight_turns() {
    let h = harness(ScriptedGenerator::constant("Keep going."), EngineConfig::default());
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    let mut fired = Vec::new();
    for i in 1..=8u32 {
        let reply = turn(&h, &format!("I am not sure ({})", i)).await.unwrap();
        if let Some(hint) = reply.hint {
            fired.push((i, hint.level, hint.kind));
        }
    }

    assert_eq!(
        fired,
        vec![(4, 1, HintKind::Nudge), (8, 2, HintKind::Example)]
    );
    assert_eq!(node_record(&h).await.hint_level, 2);

    // The hint went into the instructions of the turn it fired on.
    let requests = h.service.requests();
    assert!(requests[3].system.contains("Think about your trip to school."));
    assert!(!requests[4].system.contains("Think about your trip to school."));
    assert!(requests[7].system.contains("lunch line"));
}

/// Test: The escalate level flags the Node while the conversation continues
#[tokio::test]
async fn test_escalation_flags_node_and_conversation_continues() {
    let h = harness(ScriptedGenerator::constant("Keep going."), EngineConfig::default());
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    let mut escalated_at = None;
    for i in 1..=13u32 {
        let reply = turn(&h, "still stuck").await.unwrap();
        if reply.escalated {
            escalated_at = Some(i);
        }
    }
    assert_eq!(escalated_at, Some(12));

    let record = node_record(&h).await;
    assert_eq!(record.status, NodeStatus::NeedsReview);
    assert_eq!(record.hint_level, 3);

    let queue = h.runner.engine().review_queue("p").await.unwrap();
    assert_eq!(queue.pending.len(), 1);
    assert!(queue
        .events
        .iter()
        .any(|e| e.event == Some(SystemEvent::ReviewRequired)));

    let turns = h.store.list_turns("p", NodeId::new(1, 1)).await.unwrap();
    let learner = turns.iter().filter(|t| t.role == TurnRole::Learner).count();
    assert_eq!(learner, 13);
}

/// Test: Hint levels start over on the next Node
#[tokio::test]
async fn test_hint_level_resets_on_new_node() {
    let h = harness(
        ScriptedGenerator::constant(
            r#"{"dimensions": [{"dimension": "specificity", "score": 0.9}], "summary": "Good"}"#,
        ),
        EngineConfig::default(),
    );
    let engine = h.runner.engine().clone();
    engine.start_project("p", LearnerProfile::default()).await.unwrap();
    for _ in 0..4 {
        turn(&h, "thinking").await.unwrap();
    }
    assert_eq!(node_record(&h).await.hint_level, 1);

    engine.complete_conversation_node("p", 1, "1.1").await.unwrap();
    let next = h
        .store
        .get_node(&NodeKey::new("p", NodeId::new(1, 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.status, NodeStatus::InProgress);
    assert_eq!(next.hint_level, 0);
}

/// Test: Dropping the receiver cancels the turn and persists nothing
#[tokio::test]
async fn test_cancelled_turn_persists_nothing() {
    let h = harness(
        ScriptedGenerator::constant("A long reply in several chunks"),
        EngineConfig::default(),
    );
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let err = h
        .runner
        .run_turn(TurnRequest::new("p", 1, "1.1", "hello"), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Cancelled));

    let turns = h.store.list_turns("p", NodeId::new(1, 1)).await.unwrap();
    assert!(turns.is_empty());
}

/// Test: A reply slower than the generation timeout fails and persists nothing
#[tokio::test(start_paused = true)]
async fn test_slow_reply_times_out() {
    let config = EngineConfig {
        generation_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let h = harness(
        ScriptedGenerator::constant("late").with_delay(Duration::from_secs(5)),
        config,
    );
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    let err = turn(&h, "hello").await.unwrap_err();
    assert!(matches!(err, TurnError::Timeout(d) if d == Duration::from_secs(1)));
    let turns = h.store.list_turns("p", NodeId::new(1, 1)).await.unwrap();
    assert!(turns.is_empty());
}

/// Test: Long histories are compacted before they reach the service
#[tokio::test]
async fn test_long_history_is_compacted() {
    let config = EngineConfig {
        hints: HintThresholds {
            nudge: 100,
            example: 200,
            escalate: 300,
        },
        ..EngineConfig::default()
    };
    let h = harness(ScriptedGenerator::constant("Go on."), config);
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    let mut last = None;
    for i in 0..11 {
        last = Some(turn(&h, &format!("message {}", i)).await.unwrap());
    }
    // 10 stored exchanges (20 turns) plus the new message is over the threshold.
    assert!(last.unwrap().compacted);

    let request = h.service.requests().pop().unwrap();
    assert_eq!(request.messages[0].role, MessageRole::System);
    assert!(request.messages[0].content.starts_with("Summary of the earlier conversation"));
    assert_eq!(request.messages.len(), 11);
    assert_eq!(request.messages[10].content, "message 10");
}

/// Test: A failed turn on the hint threshold leaves the level unclaimed and
/// the retried turn carries the hint
#[tokio::test]
async fn test_failed_turn_keeps_hint_for_retry() {
    let h = harness(ScriptedGenerator::constant("Keep going."), EngineConfig::default());
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    for i in 1..=3u32 {
        turn(&h, &format!("I am not sure ({})", i)).await.unwrap();
    }

    h.service
        .push_error(GenerationError::Unavailable("backend down".to_string()));
    let err = turn(&h, "Still thinking").await.unwrap_err();
    assert!(matches!(err, TurnError::Generation(_)));
    assert_eq!(node_record(&h).await.hint_level, 0);

    let retried = turn(&h, "Still thinking").await.unwrap();
    assert_eq!(retried.hint.map(|hint| hint.level), Some(1));
    assert_eq!(node_record(&h).await.hint_level, 1);
    let requests = h.service.requests();
    assert!(requests
        .last()
        .unwrap()
        .system
        .contains("Think about your trip to school."));
}

/// Test: A failed turn on the escalation threshold does not flag the Node
#[tokio::test]
async fn test_failed_escalation_turn_leaves_node_in_progress() {
    let h = harness(ScriptedGenerator::constant("Keep going."), EngineConfig::default());
    h.runner
        .engine()
        .start_project("p", LearnerProfile::default())
        .await
        .unwrap();

    for i in 1..=11u32 {
        turn(&h, &format!("I am not sure ({})", i)).await.unwrap();
    }

    h.service
        .push_error(GenerationError::Unavailable("backend down".to_string()));
    turn(&h, "Still stuck").await.unwrap_err();
    let record = node_record(&h).await;
    assert_eq!(record.status, NodeStatus::InProgress);
    assert_eq!(record.hint_level, 2);

    let retried = turn(&h, "Still stuck").await.unwrap();
    assert!(retried.escalated);
    assert_eq!(node_record(&h).await.status, NodeStatus::NeedsReview);
}
