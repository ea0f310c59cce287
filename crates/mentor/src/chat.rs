//! Interactive session against the HTTP generation backend
//!
//! Plain lines are sent to the mentor on the current Node. Commands:
//!
//! | Command          | Effect                                   |
//! |------------------|------------------------------------------|
//! | `/done`          | complete the current conversation Node   |
//! | `/form <json>`   | submit the current Node's form           |
//! | `/help <reason>` | ask for a teacher                        |
//! | `/progress`      | print the progress snapshot              |
//! | `/quit`          | leave                                    |

use std::io::Write;

use anyhow::{Context, Result};
use progression::{
    CompletionOutcome, EngineError, LearnerProfile, ProgressionEngine, TurnError, TurnRequest,
    TurnRunner,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{build_engine, http_service, RuntimeOptions};

pub struct ChatArgs {
    pub project: String,
    pub grade: Option<u8>,
}

enum Command<'a> {
    Say(&'a str),
    Done,
    Form(&'a str),
    Help(&'a str),
    Progress,
    Quit,
}

fn parse(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    Some(match head {
        "/done" => Command::Done,
        "/form" => Command::Form(rest),
        "/help" => Command::Help(if rest.is_empty() { "I'm stuck" } else { rest }),
        "/progress" => Command::Progress,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Say(line),
    })
}

fn report(outcome: &CompletionOutcome) {
    if let Some(evaluation) = &outcome.evaluation {
        println!("score {:.2}: {}", evaluation.overall_score, evaluation.summary);
        for dim in &evaluation.dimensions {
            println!("  {:<24} {:.2}  {}", dim.dimension, dim.score, dim.feedback);
        }
    }
    match (&outcome.advance, outcome.awaiting_review) {
        (Some(advance), _) => println!("completed, {}", advance),
        (None, true) => println!("waiting for a teacher to review"),
        (None, false) => println!("not there yet, keep going"),
    }
}

async fn print_progress(engine: &ProgressionEngine, project: &str) -> Result<()> {
    let progress = engine.get_progress(project).await?;
    for step in &progress.steps {
        println!("Step {} {:<28} {}", step.step_number, step.title, step.status);
        for record in &step.nodes {
            println!("    {} {} (hint level {})", record.node, record.status, record.hint_level);
        }
    }
    println!(
        "{}/{} nodes, {} deliverables",
        progress.completed_nodes,
        progress.total_nodes,
        progress.deliverables.len()
    );
    Ok(())
}

pub async fn run(options: &RuntimeOptions, args: ChatArgs) -> Result<()> {
    let service = http_service()?;
    let engine = build_engine(options, service.clone())?;
    let runner = TurnRunner::new(engine.clone(), service);

    let profile = args.grade.map(LearnerProfile::with_grade).unwrap_or_default();
    engine.start_project(&args.project, profile).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let state = engine.load_project(&args.project).await?;
        if state.status == progression::ProjectStatus::Completed {
            println!("All steps are complete.");
            return Ok(());
        }
        let node = engine.catalog().node(state.current_node).cloned().context("Unknown current node")?;
        let id = node.id.to_string();
        print!("[{} {}] > ", id, node.title);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let Some(command) = parse(&line) else {
            continue;
        };

        let result: Result<(), EngineError> = match command {
            Command::Quit => return Ok(()),
            Command::Progress => {
                print_progress(&engine, &args.project).await?;
                Ok(())
            }
            Command::Done => engine
                .complete_conversation_node(&args.project, node.id.step, &id)
                .await
                .map(|o| report(&o)),
            Command::Form(raw) => match serde_json::from_str(raw) {
                Ok(data) => engine
                    .submit_form(&args.project, node.id.step, &id, data)
                    .await
                    .map(|o| report(&o)),
                Err(e) => {
                    println!("not valid JSON: {}", e);
                    Ok(())
                }
            },
            Command::Help(reason) => engine
                .request_help(&args.project, node.id.step, &id, reason)
                .await
                .map(|_| println!("a teacher has been asked to help")),
            Command::Say(message) => {
                let (tx, mut rx) = mpsc::channel::<String>(64);
                let printer = tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        print!("{}", chunk);
                        let _ = std::io::stdout().flush();
                    }
                    println!();
                });
                let request = TurnRequest::new(&args.project, node.id.step, &id, message);
                let turn = runner.run_turn(request, tx).await;
                printer.await?;
                match turn {
                    Ok(reply) => {
                        if let Some(hint) = reply.hint {
                            println!("(hint level {} given)", hint.level);
                        }
                        Ok(())
                    }
                    Err(TurnError::Engine(e)) => Err(e),
                    Err(e) => {
                        warn!(error = %e, "Turn failed");
                        println!("the mentor could not answer: {}", e);
                        Ok(())
                    }
                }
            }
        };

        if let Err(e) = result {
            if !e.is_client_error() {
                return Err(e.into());
            }
            println!("{} ({})", e, e.code());
        }
    }
}
