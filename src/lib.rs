//! gamesmith — an AI game-generation pipeline.
//!
//! Takes one natural-language prompt and produces a playable starter game:
//! concept extraction, design, mechanics tuning, level layout and code
//! generation, each stage backed by an LLM with self-correcting retries and
//! a deterministic fallback. Model output is treated as hostile input:
//! JSON is extracted and repaired, numbers are clamped into safe ranges,
//! and generated code is statically checked before it ships.
//!
//! The entry point is [`pipeline::Orchestrator`]; everything else is the
//! machinery behind it.

pub mod code_validator;
pub mod codegen;
pub mod concept;
pub mod config;
pub mod design;
pub mod error;
pub mod genres;
pub mod json_repair;
pub mod level;
pub mod mechanics;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod storage;
pub mod templates;
pub mod webgen;

pub use codegen::{
    AiGenerator, ExportTarget, GameCodeGenerator, GeneratedArtifact, TemplateGenerator,
};
pub use concept::GameConcept;
pub use config::{LevelRules, MechanicsLimits, PipelineConfig, RetryPolicy};
pub use design::{GameDesign, UiDesign};
pub use error::{GenerationError, Result};
pub use genres::GenreRegistry;
pub use level::{Level, LevelDesign};
pub use mechanics::GameMechanics;
pub use model::{ChatMessage, DeepSeekClient, ModelClient, ModelResponse};
pub use pipeline::{CancellationFlag, GenerationOutcome, NullPersistence, Orchestrator};
pub use storage::{
    AssetFetcher, LocalDirStorage, PersistenceSink, ProgressSink, ProgressUpdate, ResponseCache,
    StorageClient,
};
