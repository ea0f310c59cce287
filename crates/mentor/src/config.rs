//! Wiring for the CLI: engine config, catalog, store and generation backend
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags (`--config`, `--catalog`, `--state-path`)
//! 2. `PROGRESSION_*` environment variables
//! 3. Built-in defaults (in-memory store, built-in curriculum)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use progression::generation::AnthropicClient;
use progression::{
    EngineConfig, GenerationService, MemoryStore, ProgressStore, ProgressionEngine, StepCatalog,
};
use tracing::info;

/// Options shared by every subcommand that runs the engine.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// TOML engine config
    pub config: Option<PathBuf>,
    /// TOML or YAML curriculum; the built-in one otherwise
    pub catalog: Option<PathBuf>,
    /// RocksDB directory (requires the `durable` feature)
    pub state_path: Option<PathBuf>,
}

pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load engine config from {}", path.display())),
        None => Ok(EngineConfig::from_env()),
    }
}

pub fn load_catalog(path: Option<&Path>, config: &EngineConfig) -> Result<StepCatalog> {
    match path {
        Some(path) => StepCatalog::from_path(path, &config.hints)
            .with_context(|| format!("Failed to load catalog from {}", path.display())),
        None => StepCatalog::builtin(&config.hints).context("Built-in catalog is invalid"),
    }
}

#[cfg(feature = "durable")]
pub fn open_store(state_path: Option<&Path>) -> Result<Arc<dyn ProgressStore>> {
    match state_path {
        Some(path) => {
            let store = progression::store::RocksStore::open(path)
                .with_context(|| format!("Failed to open state store at {}", path.display()))?;
            info!(path = %path.display(), "Using durable store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "durable"))]
pub fn open_store(state_path: Option<&Path>) -> Result<Arc<dyn ProgressStore>> {
    if state_path.is_some() {
        anyhow::bail!("--state-path needs mentor built with the `durable` feature");
    }
    Ok(Arc::new(MemoryStore::new()))
}

/// Build an engine around `service`.
pub fn build_engine(
    options: &RuntimeOptions,
    service: Arc<dyn GenerationService>,
) -> Result<Arc<ProgressionEngine>> {
    let config = load_engine_config(options.config.as_deref())?;
    let catalog = load_catalog(options.catalog.as_deref(), &config)?;
    let store = open_store(options.state_path.as_deref())?;
    info!(
        steps = catalog.steps().len(),
        nodes = catalog.total_nodes(),
        fallback = %config.evaluation.on_unavailable,
        "Engine ready"
    );
    Ok(Arc::new(ProgressionEngine::new(
        Arc::new(catalog),
        store,
        service,
        config,
    )))
}

/// The HTTP generation client, configured from the environment.
pub fn http_service() -> Result<Arc<dyn GenerationService>> {
    let client = AnthropicClient::from_env().context("Generation client is not configured")?;
    info!(model = %client.model(), "Using HTTP generation backend");
    Ok(Arc::new(client))
}
