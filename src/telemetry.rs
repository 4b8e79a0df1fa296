//! Per-run pipeline trace
//!
//! Records stage timings, outcomes and the resolution path taken. Owned
//! exclusively by one pipeline run and surfaced to the caller on every
//! response; never consulted for correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Which strategy produced the author binding (or the answer, for the
/// semantic paths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPath {
    /// No author slot in play
    #[default]
    None,
    /// Case-insensitive exact name match
    ExactMatch,
    /// Full-text fuzzy match
    FuzzyMatch,
    /// Caller supplied a selected candidate id after a disambiguation pause
    Selected,
    /// Structured retrieval yielded nothing; answered from vector evidence
    SemanticFallback,
}

/// One recorded stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub duration_ms: u64,
    pub outcome: String,
}

/// Append-only trace for a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub resolution_path: ResolutionPath,
    pub stages: Vec<StageRecord>,
    pub total_ms: u64,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            resolution_path: ResolutionPath::None,
            stages: Vec::new(),
            total_ms: 0,
        }
    }

    /// Append a stage record measured from `started`.
    pub fn record(&mut self, stage: &str, started: Instant, outcome: &str) {
        self.stages.push(StageRecord {
            stage: stage.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome: outcome.to_string(),
        });
    }

    pub fn set_resolution_path(&mut self, path: ResolutionPath) {
        self.resolution_path = path;
    }

    pub fn finish(&mut self, started: Instant) {
        self.total_ms = started.elapsed().as_millis() as u64;
    }

    /// Whether a stage with this name was recorded (used in tests).
    pub fn has_stage(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }
}

impl Default for PipelineTrace {
    fn default() -> Self {
        Self::new()
    }
}
