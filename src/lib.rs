//! scholarqa: natural-language question answering over a research
//! publication graph.
//!
//! A question comes in, an answer goes out. In between, a pipeline of
//! cooperating stages:
//!
//! 1. **Intent classification** ([`intent`]): an LLM maps the question
//!    onto a closed category taxonomy with extracted slots.
//! 2. **Author resolution** ([`resolve`]): name fragments resolve
//!    exact-then-fuzzy against the graph, pausing the turn for
//!    disambiguation when the match is ambiguous.
//! 3. **Query generation** ([`generate`]): deterministic parameterized
//!    templates where possible, schema-constrained LLM generation where
//!    not, all structurally validated before execution.
//! 4. **Semantic search** ([`semantic`]): vector-index retrieval over
//!    publication abstract embeddings, run speculatively in parallel
//!    with classification.
//! 5. **Synthesis** ([`synthesize`]): evidence becomes a grounded
//!    natural-language answer, degrading to a plain evidence rendering
//!    when the model is unavailable.
//!
//! [`pipeline::Pipeline`] is the orchestrator tying these together; it
//! is the only type most hosts need, along with [`pipeline::TurnRequest`]
//! and [`pipeline::TurnResponse`].

pub mod ai;
pub mod config;
pub mod error;
pub mod generate;
pub mod graph;
pub mod intent;
pub mod pipeline;
pub mod resolve;
pub mod semantic;
pub mod synthesize;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{GenerationError, PipelineError};
pub use pipeline::{ContinuationToken, Pipeline, TurnRequest, TurnResponse};
