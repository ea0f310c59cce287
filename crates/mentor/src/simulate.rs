//! Offline walkthrough of a whole curriculum
//!
//! Every Node is completed the way a learner would: forms are filled with
//! sample answers, conversation Nodes get a few turns and then "I'm done".
//! Generation is answered locally, so no network or API key is needed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use progression::{
    Advance, FieldKind, FormField, GenerationError, GenerationRequest, GenerationService,
    LearnerProfile, ProjectStatus, TurnRequest, TurnRunner,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{build_engine, RuntimeOptions};

/// Local stand-in for the generation backend.
pub struct SimulatedMentor {
    score: f64,
}

impl SimulatedMentor {
    pub fn new(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl GenerationService for SimulatedMentor {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if request.system.contains("## Rubric") {
            return Ok(json!({
                "dimensions": [{ "dimension": "overall", "score": self.score, "feedback": "simulated" }],
                "summary": "Simulated assessment."
            })
            .to_string());
        }
        if request.system.contains("Purpose:") {
            let excerpt: String = last.chars().take(160).collect();
            return Ok(format!("Draft document based on:\n{}", excerpt));
        }
        Ok("That's a good start. What else did you notice?".to_string())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

pub struct SimulateArgs {
    pub project: String,
    pub score: f64,
    pub grade: Option<u8>,
    pub turns: usize,
}

fn sample_fields(fields: &[FormField]) -> Value {
    let mut map = serde_json::Map::new();
    for field in fields {
        let value = match field.kind {
            FieldKind::Text | FieldKind::Textarea => json!(format!("Sample {}", field.name)),
            FieldKind::Select => json!(field.options.first().cloned().unwrap_or_default()),
            FieldKind::Number => json!(1),
            FieldKind::Array => {
                let count = field.min_items.unwrap_or(1).max(1);
                Value::Array((0..count).map(|_| sample_fields(&field.item_fields)).collect())
            }
        };
        map.insert(field.name.clone(), value);
    }
    Value::Object(map)
}

pub async fn run(options: &RuntimeOptions, args: SimulateArgs) -> Result<()> {
    let service: Arc<dyn GenerationService> = Arc::new(SimulatedMentor::new(args.score));
    let engine = build_engine(options, service.clone())?;
    let runner = TurnRunner::new(engine.clone(), service);

    let profile = args.grade.map(LearnerProfile::with_grade).unwrap_or_default();
    engine.start_project(&args.project, profile).await?;
    info!(project_id = %args.project, score = args.score, "Simulation started");

    let limit = engine.catalog().total_nodes() * 2;
    for _ in 0..limit {
        let state = engine.load_project(&args.project).await?;
        if state.status == ProjectStatus::Completed {
            break;
        }
        let node = engine
            .catalog()
            .node(state.current_node)
            .cloned()
            .context("Project points at a node missing from the catalog")?;
        let id = node.id.to_string();

        let outcome = match &node.form {
            Some(schema) => {
                engine
                    .submit_form(&args.project, node.id.step, &id, sample_fields(&schema.fields))
                    .await?
            }
            None => {
                for i in 0..args.turns {
                    let (tx, mut rx) = mpsc::channel(64);
                    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
                    let request = TurnRequest::new(
                        &args.project,
                        node.id.step,
                        &id,
                        &format!("Here is my thinking about {} (part {})", node.title, i + 1),
                    );
                    let reply = runner.run_turn(request, tx).await?;
                    drain.await?;
                    debug!(node = %node.id, hint = ?reply.hint.map(|h| h.level), "Simulated turn");
                }
                engine
                    .complete_conversation_node(&args.project, node.id.step, &id)
                    .await?
            }
        };

        let score = outcome
            .evaluation
            .as_ref()
            .map(|e| format!("{:.2}", e.overall_score))
            .unwrap_or_else(|| "-".to_string());

        let advance = if outcome.awaiting_review {
            println!("{:>4}  {:<32} score {:>5}  awaiting review, approving", id, node.title, score);
            engine
                .approve_node(&args.project, node.id.step, &id)
                .await?
                .advance
        } else if outcome.passed {
            outcome.advance
        } else {
            bail!(
                "Node {} did not pass with score {}; raise --score to finish the walkthrough",
                id,
                score
            );
        };

        match advance {
            Some(Advance::Next { node: next, .. }) => {
                println!("{:>4}  {:<32} score {:>5}  -> {}", id, node.title, score, next)
            }
            Some(Advance::Finished) => {
                println!("{:>4}  {:<32} score {:>5}  -> finished", id, node.title, score)
            }
            None => bail!("Node {} passed without advancing", id),
        }
    }

    let progress = engine.get_progress(&args.project).await?;
    println!(
        "\n{}/{} nodes completed, {} deliverables, project {}",
        progress.completed_nodes,
        progress.total_nodes,
        progress.deliverables.len(),
        progress.project.status
    );
    if progress.project.status != ProjectStatus::Completed {
        bail!("Simulation stopped before the curriculum finished");
    }
    Ok(())
}
