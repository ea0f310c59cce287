//! Turn Runner: one conversational exchange on the active Node
//!
//! ```text
//! learner message
//!   │
//!   ├─ count learner turns (including this one)
//!   ├─ next_hint ─▶ candidate hint
//!   ├─ prior outputs + carry-over inputs + history + candidate ─▶ context
//!   ├─ stream reply under the generation timeout, forwarding chunks
//!   ├─ CAS hint level ──escalate──▶ needs_review + event
//!   └─ persist learner turn + assistant turn together
//! ```
//!
//! Nothing is written until the stream has finished. A failed, timed-out or
//! cancelled turn leaves the transcript and the hint level exactly as they
//! were, so the retried turn offers the same hint. A candidate whose level
//! was claimed by a concurrent turn is dropped from the reply.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{HintKind, HintLevel};
use crate::engine::{EngineError, ProgressionEngine};
use crate::generation::{GenerationError, GenerationService};
use crate::hints::next_hint;
use crate::model::{ConversationTurn, LearnerProfile, NodeKey, NodeStatus, TurnRole};

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The chunk receiver went away before the reply finished
    #[error("Turn cancelled by the client")]
    Cancelled,

    #[error("Reply timed out after {0:?}")]
    Timeout(Duration),
}

/// One learner message on a Node.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub project_id: String,
    pub step: u32,
    pub node_id: String,
    pub message: String,
    /// Overrides the profile stored with the project
    pub profile: Option<LearnerProfile>,
}

impl TurnRequest {
    pub fn new(project_id: &str, step: u32, node_id: &str, message: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            step,
            node_id: node_id.to_string(),
            message: message.to_string(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: LearnerProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Outcome of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    /// Full assistant reply
    pub reply: String,
    /// Hint injected into this turn's instructions
    pub hint: Option<HintLevel>,
    /// The hint flagged the Node for a teacher
    pub escalated: bool,
    /// Older history was summarized
    pub compacted: bool,
}

/// Runs conversational turns against the engine's store.
pub struct TurnRunner {
    engine: Arc<ProgressionEngine>,
    service: Arc<dyn GenerationService>,
}

impl TurnRunner {
    pub fn new(engine: Arc<ProgressionEngine>, service: Arc<dyn GenerationService>) -> Self {
        Self { engine, service }
    }

    pub fn engine(&self) -> &Arc<ProgressionEngine> {
        &self.engine
    }

    /// Run one turn, forwarding reply chunks to `chunks` as they arrive.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TurnReply, TurnError> {
        let engine = &self.engine;
        let project_id = request.project_id.as_str();
        let node = engine.resolve(request.step, &request.node_id)?;
        let project = engine.load_project(project_id).await?;
        let key = NodeKey::new(project_id, node.id);
        let record = engine.reached(&key).await?;

        if !record.status.is_open() {
            return Err(EngineError::InvalidTransition {
                node: node.id,
                from: record.status,
                action: "continue the conversation on",
            }
            .into());
        }

        let store = engine.store();
        let mut history = store.list_turns(project_id, node.id).await.map_err(EngineError::from)?;
        let learner_turns = history.iter().filter(|t| t.role == TurnRole::Learner).count();
        let turn_count = u32::try_from(learner_turns + 1).unwrap_or(u32::MAX);

        let candidate = next_hint(turn_count, &node.hints, record.hint_level).cloned();

        let profile = request.profile.clone().unwrap_or_else(|| project.learner.clone());
        let prior = engine.prior_outputs(project_id, node).await?;

        let learner_turn = ConversationTurn::learner(project_id, node.id, &request.message);
        history.push(learner_turn.clone());
        let context = engine
            .context_builder()
            .build(node, &profile, &prior, &history, candidate.as_ref());
        let compacted = context.compacted;
        let generation = context.into_request(engine.config().max_reply_tokens);

        let limit = engine.config().generation_timeout();
        let streamed = tokio::time::timeout(limit, async {
            let mut stream = self.service.stream(&generation).await?;
            let mut reply = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                reply.push_str(&chunk);
                if chunks.send(chunk).await.is_err() {
                    return Err(TurnError::Cancelled);
                }
            }
            Ok(reply)
        })
        .await;

        let reply = match streamed {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply,
            Ok(Ok(_)) => return Err(GenerationError::EmptyReply.into()),
            Ok(Err(e)) => {
                warn!(project_id, node = %node.id, error = %e, "Turn abandoned, nothing persisted");
                return Err(e);
            }
            Err(_) => {
                warn!(project_id, node = %node.id, ?limit, "Turn timed out, nothing persisted");
                return Err(TurnError::Timeout(limit));
            }
        };

        let mut hint = None;
        let mut escalated = false;
        if let Some(candidate) = candidate {
            let claimed = store
                .set_hint_level(&key, record.hint_level, candidate.level)
                .await
                .map_err(EngineError::from)?;
            if claimed {
                info!(
                    project_id,
                    node = %node.id,
                    level = candidate.level,
                    kind = %candidate.kind,
                    turn_count,
                    "Hint fired"
                );
                if candidate.kind == HintKind::Escalate && record.status == NodeStatus::InProgress {
                    let reason = format!(
                        "No progress after {} learner turns; a teacher should check in.",
                        turn_count
                    );
                    escalated = engine.flag_for_review(project_id, node.id, &reason).await?;
                }
                hint = Some(candidate);
            } else {
                debug!(project_id, node = %node.id, "Hint level claimed by a concurrent turn");
            }
        }

        let assistant_turn = ConversationTurn::assistant(project_id, node.id, &reply);
        store
            .append_turns(vec![learner_turn, assistant_turn])
            .await
            .map_err(EngineError::from)?;
        debug!(project_id, node = %node.id, turn_count, chars = reply.len(), "Turn persisted");

        Ok(TurnReply {
            reply,
            hint,
            escalated,
            compacted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NodeId, StepCatalog};
    use crate::config::EngineConfig;
    use crate::generation::ScriptedGenerator;
    use crate::store::MemoryStore;

    fn runner(service: Arc<ScriptedGenerator>) -> TurnRunner {
        let config = EngineConfig::default();
        let catalog = Arc::new(StepCatalog::builtin(&config.hints).unwrap());
        let engine = ProgressionEngine::new(catalog, Arc::new(MemoryStore::new()), service.clone(), config);
        TurnRunner::new(Arc::new(engine), service)
    }

    #[tokio::test]
    async fn test_turn_on_unreached_node_fails() {
        let runner = runner(Arc::new(ScriptedGenerator::constant("hi")));
        runner
            .engine()
            .start_project("p", LearnerProfile::default())
            .await
            .unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let err = runner
            .run_turn(TurnRequest::new("p", 1, "1.2", "hello"), tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Engine(EngineError::NodeNotReached { .. })
        ));
    }

    #[tokio::test]
    async fn test_reply_chunks_forwarded_and_turns_persisted() {
        let service = Arc::new(ScriptedGenerator::constant("What did you notice today?"));
        let runner = runner(service);
        runner
            .engine()
            .start_project("p", LearnerProfile::default())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let reply = runner
            .run_turn(TurnRequest::new("p", 1, "1.1", "hello"), tx)
            .await
            .unwrap();
        assert_eq!(reply.reply, "What did you notice today?");
        assert!(reply.hint.is_none());

        let mut forwarded = String::new();
        while let Some(chunk) = rx.recv().await {
            forwarded.push_str(&chunk);
        }
        assert_eq!(forwarded, reply.reply);

        let turns = runner
            .engine()
            .store()
            .list_turns("p", NodeId::new(1, 1))
            .await
            .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::Learner);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn test_generation_failure_persists_nothing() {
        let runner = runner(Arc::new(ScriptedGenerator::failing()));
        runner
            .engine()
            .start_project("p", LearnerProfile::default())
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let err = runner
            .run_turn(TurnRequest::new("p", 1, "1.1", "hello"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(_)));
        let turns = runner
            .engine()
            .store()
            .list_turns("p", NodeId::new(1, 1))
            .await
            .unwrap();
        assert!(turns.is_empty());
    }
}
