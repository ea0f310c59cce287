//! mentor: operator CLI for the guided progression engine
//!
//! # Usage
//!
//! ```bash
//! # Print the built-in curriculum
//! mentor catalog
//!
//! # Validate a curriculum file
//! mentor check curriculum.toml
//!
//! # Walk a project through every Node offline
//! mentor simulate --score 0.8
//!
//! # Talk to the mentor (needs ANTHROPIC_API_KEY)
//! mentor chat --project demo --grade 7
//! ```

mod chat;
mod config;
mod simulate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use progression::{HintThresholds, StepCatalog};
use tracing::info;

use config::RuntimeOptions;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML engine config (overrides PROGRESSION_* defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Curriculum file (TOML or YAML); the built-in curriculum otherwise
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// RocksDB directory for durable progress (requires the `durable` feature)
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the curriculum
    Catalog {
        /// Curriculum file to print instead of the built-in one
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a curriculum file
    Check { file: PathBuf },
    /// Drive a project through every Node with a local scripted mentor
    Simulate {
        #[arg(long, default_value = "simulation")]
        project: String,

        /// Score the simulated assessor gives every rubric
        #[arg(long, default_value_t = 0.8)]
        score: f64,

        #[arg(long)]
        grade: Option<u8>,

        /// Learner turns on each conversation Node before "I'm done"
        #[arg(long, default_value_t = 2)]
        turns: usize,
    },
    /// Interactive session on the current Node
    Chat {
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        grade: Option<u8>,
    },
}

fn print_catalog(catalog: &StepCatalog) {
    for step in catalog.steps() {
        println!("Step {}: {}", step.step_number, step.title);
        println!("  {}", step.description);
        for node in &step.nodes {
            let deliverable = node
                .deliverable
                .as_ref()
                .map(|d| format!(" -> {}", d.kind))
                .unwrap_or_default();
            println!(
                "  {:>4}  {:<32} {:<12} {:?}{}",
                node.id.to_string(),
                node.title,
                node.kind.to_string(),
                node.completion,
                deliverable
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let options = RuntimeOptions {
        config: args.config,
        catalog: args.catalog,
        state_path: args.state_path,
    };

    match args.command {
        Command::Catalog { file, json } => {
            let engine_config = config::load_engine_config(options.config.as_deref())?;
            let path = file.or(options.catalog);
            let catalog = config::load_catalog(path.as_deref(), &engine_config)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(catalog.steps())
                        .context("Failed to render catalog")?
                );
            } else {
                print_catalog(&catalog);
            }
        }
        Command::Check { file } => {
            let catalog = StepCatalog::from_path(&file, &HintThresholds::default())
                .with_context(|| format!("{} is not a valid curriculum", file.display()))?;
            info!(
                steps = catalog.steps().len(),
                nodes = catalog.total_nodes(),
                "Catalog is valid"
            );
            println!(
                "{}: {} steps, {} nodes, ok",
                file.display(),
                catalog.steps().len(),
                catalog.total_nodes()
            );
        }
        Command::Simulate {
            project,
            score,
            grade,
            turns,
        } => {
            simulate::run(
                &options,
                simulate::SimulateArgs {
                    project,
                    score,
                    grade,
                    turns,
                },
            )
            .await?;
        }
        Command::Chat { project, grade } => {
            let project = project.unwrap_or_else(|| format!("chat-{}", uuid::Uuid::new_v4()));
            println!("project {}", project);
            chat::run(&options, chat::ChatArgs { project, grade }).await?;
        }
    }

    Ok(())
}
