//! Error taxonomy of the turn pipeline.
//!
//! Collaborators (model, index, instruction storage) report failures as
//! `anyhow::Error`; the pipeline classifies them into [`PipelineError`].
//! Only the orchestrator decides what a failure means for the caller.

use std::fmt;

use thiserror::Error;

/// The pipeline step an external call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Instructions,
    Rewrite,
    Retrieval,
    Synthesis,
    DirectAnswer,
    Title,
    Ingest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Instructions => "instructions",
            Stage::Rewrite => "rewrite",
            Stage::Retrieval => "retrieval",
            Stage::Synthesis => "synthesis",
            Stage::DirectAnswer => "direct answer",
            Stage::Title => "title",
            Stage::Ingest => "ingest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request itself is unacceptable; retrying will not help.
    #[error("{0}")]
    Validation(String),

    /// An external call failed (network, quota, timeout, bad response).
    #[error("{stage} call failed: {message}")]
    Transient { stage: Stage, message: String },

    /// Synthesis and the last-resort direct call both failed.
    #[error("synthesis failed and the direct fallback failed too: {0}")]
    TotalSynthesisFailure(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    /// Wrap a collaborator error, keeping its full context chain.
    pub fn transient(stage: Stage, err: &anyhow::Error) -> Self {
        PipelineError::Transient {
            stage,
            message: format!("{:#}", err),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
