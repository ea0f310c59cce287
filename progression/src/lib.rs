//! Guided Progression Engine
//!
//! This library drives a learner through a fixed, multi-step curriculum:
//! - A static step catalog of Nodes with completion criteria, rubrics and hint ladders
//! - Completion gating by form validation, AI rubric scoring, or teacher review
//! - Hint escalation over conversational stall
//! - Deliverable generation from the learner's own inputs
//! - Per-project single-writer state via compare-and-swap in the store
//!
//! # Components
//!
//! - [`catalog`]: immutable curriculum registry (built-in or loaded from TOML/YAML)
//! - [`form`]: form schema validation
//! - [`context`]: instruction assembly, carry-over and history compaction
//! - [`evaluator`]: rubric scoring with an explicit fallback policy
//! - [`hints`]: pure hint escalation decisions
//! - [`deliverable`]: summary artifact generation with raw-text fallback
//! - [`engine`]: the progression state machine
//! - [`turn`]: the conversational turn path (streaming, hint injection)
//! - [`store`]: persistence trait, in-memory store, RocksDB store (`durable` feature)
//! - [`generation`]: generation service trait and HTTP client
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use progression::{EngineConfig, MemoryStore, ProgressionEngine, StepCatalog};
//! use progression::generation::AnthropicClient;
//!
//! let config = EngineConfig::from_env();
//! let catalog = Arc::new(StepCatalog::builtin(&config.hints)?);
//! let service = Arc::new(AnthropicClient::from_env()?);
//! let engine = ProgressionEngine::new(catalog, Arc::new(MemoryStore::new()), service, config);
//!
//! engine.start_project("project-1", Default::default()).await?;
//! let outcome = engine.submit_form("project-1", 1, "1.1", data).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod deliverable;
pub mod engine;
pub mod evaluator;
pub mod form;
pub mod generation;
pub mod hints;
pub mod model;
pub mod store;
pub mod turn;

// Re-export catalog types
pub use catalog::{
    CatalogError, CompletionCriteria, Criterion, DeliverableSpec, FieldKind, FormField,
    FormSchema, HintKind, HintLevel, NodeDefinition, NodeId, NodeInput, NodeKind,
    StepCatalog, StepDefinition,
};

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export engine types
pub use engine::{
    Advance, CompletionOutcome, EngineError, EngineResult, ProgressSnapshot, ProgressionEngine,
    ReviewQueue, StepProgress, StepStatus,
};

// Re-export context and deliverable types
pub use context::{BuiltContext, CompactionConfig, ContextBuilder, PriorOutputs};
pub use deliverable::{DeliverableGenerator, GeneratedDocument, NodeInputs};
pub use form::FieldError;

// Re-export evaluator types
pub use evaluator::{
    DimensionScore, EvaluationPolicy, EvaluationResult, Evaluator, FallbackMode,
};

// Re-export hint types
pub use hints::{next_hint, HintThresholds};

// Re-export persistent model types
pub use model::{
    CommentAuthor, ConversationTurn, Deliverable, DeliverableContent, DeliverableStatus,
    FormSubmission, LearnerProfile, NewDeliverable, NodeKey, NodeProgressRecord, NodeStatus,
    ProjectProgressState, ProjectStatus, SourceSnapshot, SystemEvent, TurnRole,
};

// Re-export store types
pub use store::{MemoryStore, ProgressStore, StoreError, StoreResult, Transition};

// Re-export generation types
pub use generation::{
    ChatMessage, GenerationError, GenerationRequest, GenerationService, MessageRole,
    ScriptedGenerator,
};

// Re-export turn path types
pub use turn::{TurnError, TurnReply, TurnRequest, TurnRunner};
