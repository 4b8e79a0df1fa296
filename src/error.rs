//! Error handling for the question-answering pipeline
//!
//! This module provides idiomatic Rust error types using thiserror. The
//! top-level `PipelineError` mirrors the stage structure of a turn:
//! classification, resolution, generation, execution, synthesis. The first
//! four are fatal to the current turn; synthesis failures are recovered by
//! the orchestrator, which falls back to rendering the raw evidence.
//!
//! `NotFound` is deliberately NOT an error: an author fragment with no
//! matches is a normal resolver outcome and flows through the pipeline as
//! data, so that "nothing found" and "something went wrong" can never be
//! conflated in the answer text.

use thiserror::Error;

use crate::ai::LlmError;
use crate::graph::GraphError;

/// Top-level error for a pipeline turn, tagged by the failing stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The intent classifier was unreachable or timed out. This is never
    /// silently downgraded to a default intent: a wrong default would risk
    /// confidently wrong answers.
    #[error("intent classification failed: {0}")]
    Classification(String),

    /// The data layer was unreachable during author resolution. Distinct
    /// from a NotFound outcome, which is not an error.
    #[error("author resolution failed: {0}")]
    Resolution(String),

    /// No template exists for the intent and LLM-assisted generation did
    /// not produce structurally valid output.
    #[error("query generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The graph rejected or failed the generated query. Not retried:
    /// queries are generated fresh each turn, so re-running an identical
    /// malformed query is pointless.
    #[error("graph execution failed: {0}")]
    Execution(String),

    /// Answer synthesis failed. The orchestrator recovers from this one by
    /// returning the raw evidence without narrative text.
    #[error("answer synthesis failed: {0}")]
    Synthesis(String),
}

impl PipelineError {
    /// Stage tag surfaced to the caller alongside the message.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Classification(_) => "classification",
            PipelineError::Resolution(_) => "resolution",
            PipelineError::Generation(_) => "generation",
            PipelineError::Execution(_) => "execution",
            PipelineError::Synthesis(_) => "synthesis",
        }
    }
}

impl From<GraphError> for PipelineError {
    fn from(e: GraphError) -> Self {
        PipelineError::Execution(e.to_string())
    }
}

/// Errors from the query generator's template and LLM paths.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("no template for intent category '{0}'")]
    NoTemplate(String),

    #[error("placeholder '${0}' is referenced but not bound")]
    UnboundPlaceholder(String),

    #[error("generated query references '{0}', which is outside the fixed schema")]
    SchemaViolation(String),

    #[error("generated query contains write clause '{0}'; pipeline is read-only")]
    WriteClause(String),

    #[error("generated output is not a usable query: {0}")]
    InvalidOutput(String),

    #[error("generation model call failed: {0}")]
    Llm(#[from] LlmError),
}
