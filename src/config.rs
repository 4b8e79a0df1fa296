//! Pipeline configuration
//!
//! Tunables for the resolution and synthesis pipeline. Defaults come from
//! the environment where it makes sense (connection settings) and from
//! fixed constants elsewhere. Thresholds that encode policy (the fuzzy
//! auto-accept floor, the semantic relevance floor) are named fields here
//! rather than constants buried in branching logic, so they can be tuned
//! without touching the pipeline.

use std::time::Duration;

/// Configuration for a question-answering pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum similarity for a semantic hit to count as relevant when
    /// augmenting a topic-flavored structured query.
    pub min_relevance: f32,

    /// Fuzzy resolution: a single candidate at or above this normalized
    /// [0,1] score is auto-accepted; anything else goes to disambiguation.
    /// Policy-sensitive and tunable, not a contract guarantee.
    pub fuzzy_confidence_floor: f32,

    /// Maximum number of fuzzy candidates surfaced for disambiguation.
    pub max_candidates: usize,

    /// Top-k for topic-driven semantic search (filtered by min_relevance).
    pub topic_top_k: usize,

    /// Top-k for the semantic-fallback search over the whole question.
    pub semantic_top_k: usize,

    /// Conversation history retained per turn (messages, not Q&A pairs).
    pub history_limit: usize,

    /// Per-call deadlines. A stage timeout is treated identically to that
    /// stage's hard failure.
    pub classify_timeout: Duration,
    pub embed_timeout: Duration,
    pub graph_timeout: Duration,
    pub synthesis_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_relevance: 0.7,
            fuzzy_confidence_floor: 0.92,
            max_candidates: 5,
            topic_top_k: 200,
            semantic_top_k: 20,
            history_limit: 10,
            classify_timeout: Duration::from_secs(30),
            embed_timeout: Duration::from_secs(30),
            graph_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Set the semantic relevance floor
    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    /// Set the fuzzy auto-accept floor
    pub fn with_fuzzy_confidence_floor(mut self, floor: f32) -> Self {
        self.fuzzy_confidence_floor = floor;
        self
    }

    /// Set the disambiguation candidate limit
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Set the fallback semantic search top-k
    pub fn with_semantic_top_k(mut self, top_k: usize) -> Self {
        self.semantic_top_k = top_k;
        self
    }

    /// Apply one deadline to every external call
    pub fn with_uniform_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self.embed_timeout = timeout;
        self.graph_timeout = timeout;
        self.synthesis_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = PipelineConfig::default();
        assert!(config.min_relevance > 0.0 && config.min_relevance < 1.0);
        assert!(config.fuzzy_confidence_floor > config.min_relevance);
        assert!(config.max_candidates >= 1);
        assert!(config.semantic_top_k <= config.topic_top_k);
    }

    #[test]
    fn test_builder_setters() {
        let config = PipelineConfig::default()
            .with_fuzzy_confidence_floor(0.8)
            .with_max_candidates(10)
            .with_uniform_timeout(Duration::from_secs(5));
        assert_eq!(config.fuzzy_confidence_floor, 0.8);
        assert_eq!(config.max_candidates, 10);
        assert_eq!(config.classify_timeout, Duration::from_secs(5));
        assert_eq!(config.synthesis_timeout, Duration::from_secs(5));
    }
}
