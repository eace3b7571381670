//! Error taxonomy for the generation pipeline.
//!
//! Only genuinely unrecoverable failures propagate out of the pipeline.
//! Validation-correctable defects (out-of-range mechanics, bad enums,
//! out-of-bounds coordinates) are auto-corrected and logged, never raised.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// A retry-controlled stage burned through every attempt without a
    /// successful parse. Callers decide whether a deterministic fallback
    /// substitutes for the stage.
    #[error("{task} exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        task: String,
        attempts: u32,
        last_error: String,
    },

    /// The model answered 200 with empty content. Eligible for retry,
    /// distinct from a transport error.
    #[error("model returned empty content")]
    EmptyContent,

    #[error("could not parse model output: {0}")]
    Parse(String),

    /// Transport-level failure surfaced by the HTTP client after its own
    /// backoff retries are spent.
    #[error("model request failed: {0}")]
    Model(#[from] reqwest::Error),

    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("artifact io error: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("generation cancelled")]
    Cancelled,

    /// No fallback available; the project is marked failed and no partial
    /// artifact is published.
    #[error("{0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, GenerationError>;
