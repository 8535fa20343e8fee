//! Generation backend abstraction.
//!
//! A [`Generator`] is the heavyweight model-inference collaborator that the
//! scheduler calls once per job. Calls are blocking from the worker's point of
//! view and may take minutes; the scheduler bounds how many run at once.

use std::fmt;

use thiserror::Error;

use crate::types::{GenerationOutput, GenerationParams};

/// Failure reported by a generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The backend ran and reported a failure.
    #[error("generation failed: {0}")]
    Failed(String),

    /// The backend could not be reached or is not loaded.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// An external backend process could not be started.
    #[error("failed to start backend process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend exited abnormally.
    #[error("backend process exited with {status}: {stderr}")]
    ProcessExit { status: String, stderr: String },

    /// The backend returned output the scheduler cannot interpret.
    #[error("backend returned invalid output: {0}")]
    InvalidOutput(String),

    /// I/O error while talking to the backend or writing artifacts.
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded model instance that can render one job at a time per call.
///
/// Implementations must be shareable across worker threads. The scheduler
/// never calls the same job twice and never retries a failed call.
pub trait Generator: Send + Sync + fmt::Debug {
    /// Human-readable backend kind, e.g. "command" or "preview".
    fn kind(&self) -> &'static str;

    /// Renders one job. Blocks until the backend is done.
    fn generate(&self, params: &GenerationParams) -> Result<GenerationOutput, GenerationError>;
}
