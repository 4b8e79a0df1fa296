//! Pipeline orchestrator
//!
//! The coordinating state machine for one question-answering turn:
//!
//! ```text
//! Start -> Classifying & SearchingSemantic (parallel)
//!       -> Resolving (if an author slot is present)
//!       -> AwaitingDisambiguation (suspension point, terminal for this turn)
//!       -> Generating -> Executing -> Synthesizing -> Done
//! ```
//!
//! Classification and question embedding run as a speculative fork/join:
//! both are launched together and joined before the branch decision, so
//! semantic results are often ready by the time we know they are needed.
//!
//! A disambiguation pause suspends the turn: the candidate list goes back
//! to the caller together with a serializable continuation token
//! `{intent, question}`. The follow-up request carries the token and a
//! selected candidate id and re-enters at Generating - classification and
//! resolution are not re-run. The token, not server-side session state,
//! is what carries the intent across the suspension.
//!
//! Failure policy: classification, resolution, generation and execution
//! failures abort the turn with the failing stage tagged; synthesis
//! failures degrade to a plain rendering of the evidence; nothing is
//! retried.

use crate::ai::{ChatMessage, EmbeddingClient, LlmClient};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::generate::{QueryGenerator, QuerySource};
use crate::graph::{GraphStore, Params, Row};
use crate::intent::{Intent, IntentCategory, IntentClassifier};
use crate::resolve::{AuthorCandidate, EntityResolver, ResolutionOutcome};
use crate::semantic::{SemanticHit, SemanticSearch};
use crate::synthesize::{render_evidence, Synthesizer, OPEN_NO_RESULTS_ANSWER};
use crate::telemetry::{PipelineTrace, ResolutionPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{info, warn};

/// Paused-turn state the caller round-trips across a disambiguation
/// pause. Serializable by design: no server-side session affinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub intent: Intent,
    pub question: String,
}

/// One incoming turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub question: String,
    pub history: Vec<ChatMessage>,
    /// Set on a follow-up turn completing a disambiguation.
    pub selected_author_id: Option<String>,
    /// Required alongside `selected_author_id`; carries the original
    /// intent and question across the pause.
    pub continuation: Option<ContinuationToken>,
}

impl TurnRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Build the follow-up request for a disambiguation selection.
    pub fn with_selection(mut self, id: impl Into<String>, token: ContinuationToken) -> Self {
        self.selected_author_id = Some(id.into());
        self.continuation = Some(token);
        self
    }
}

/// The turn's result. A non-empty `candidates` list means no answer was
/// produced yet: the caller must resubmit with a selected id and the
/// attached continuation token.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub answer: String,
    pub intent: Intent,
    pub query: Option<String>,
    pub rows: Vec<Row>,
    pub hits: Vec<SemanticHit>,
    pub candidates: Vec<AuthorCandidate>,
    pub continuation: Option<ContinuationToken>,
    pub trace: PipelineTrace,
}

/// Lazily materialized speculative question embedding. A failed attempt
/// stays failed: re-embedding would be a retry, and the pipeline does not
/// retry.
enum EmbeddingState {
    NotRequested,
    Ready(Vec<f32>),
    Failed(String),
}

/// The pipeline controller. One instance serves many concurrent,
/// non-interacting runs; the graph driver and model clients are the only
/// shared resources.
pub struct Pipeline {
    classifier: IntentClassifier,
    resolver: EntityResolver,
    generator: QueryGenerator,
    semantic: SemanticSearch,
    synthesizer: Synthesizer,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            resolver: EntityResolver::new(graph.clone(), &config),
            generator: QueryGenerator::new(llm.clone()),
            semantic: SemanticSearch::new(graph.clone(), embedder.clone(), &config),
            synthesizer: Synthesizer::new(llm),
            graph,
            embedder,
            config,
        }
    }

    /// Run one full turn.
    pub async fn answer(&self, request: TurnRequest) -> Result<TurnResponse, PipelineError> {
        let run_start = Instant::now();
        let mut trace = PipelineTrace::new();
        let mut embedding = EmbeddingState::NotRequested;

        let history_start = request
            .history
            .len()
            .saturating_sub(self.config.history_limit);
        let history = &request.history[history_start..];

        // ~~~ Classification / resume ~~~
        let (question, intent) = match (&request.selected_author_id, request.continuation) {
            (Some(selected), Some(token)) => {
                let intent = self
                    .resume_selection(token.intent, selected, &mut trace)
                    .await?;
                (token.question, intent)
            }
            _ => {
                let question = request.question.clone();
                let intent = self
                    .classify_speculatively(&question, history, &mut embedding, &mut trace)
                    .await?;

                // ~~~ Author resolution ~~~
                match self
                    .resolve_author(&question, intent, &mut trace)
                    .await?
                {
                    ResolvedIntent::Ready(intent) => (question, intent),
                    ResolvedIntent::NeedsDisambiguation {
                        intent,
                        fragment,
                        candidates,
                    } => {
                        trace.finish(run_start);
                        return Ok(TurnResponse {
                            answer: format!(
                                "I couldn't find an exact match for '{}', but I found similar researchers. Please select one:",
                                fragment
                            ),
                            continuation: Some(ContinuationToken {
                                intent: intent.clone(),
                                question,
                            }),
                            intent,
                            query: None,
                            rows: vec![],
                            hits: vec![],
                            candidates,
                            trace,
                        });
                    }
                }
            }
        };

        // ~~~ Branch decision ~~~
        let mut response = if intent.category.is_template() && intent.has_required_slots() {
            self.run_templated(&question, &intent, history, &mut embedding, &mut trace)
                .await?
        } else {
            self.run_semantic_fallback(&question, &intent, history, &mut embedding, &mut trace)
                .await?
        };

        trace.finish(run_start);
        response.intent = intent;
        response.trace = trace;
        info!(
            run_id = %response.trace.run_id,
            total_ms = response.trace.total_ms,
            path = ?response.trace.resolution_path,
            "turn complete"
        );
        Ok(response)
    }

    /// Fork/join of intent classification and the speculative question
    /// embedding.
    async fn classify_speculatively(
        &self,
        question: &str,
        history: &[ChatMessage],
        embedding: &mut EmbeddingState,
        trace: &mut PipelineTrace,
    ) -> Result<Intent, PipelineError> {
        let started = Instant::now();
        let (classified, embedded) = tokio::join!(
            timeout(
                self.config.classify_timeout,
                self.classifier.classify(question, history)
            ),
            timeout(self.config.embed_timeout, self.embedder.embed(question)),
        );

        let intent = match classified {
            Err(_) => {
                return Err(PipelineError::Classification(
                    "classifier timed out".to_string(),
                ))
            }
            Ok(result) => result?,
        };

        // The embedding is speculative: a failure here only matters if a
        // semantic branch ends up needing it.
        *embedding = match embedded {
            Ok(Ok(vector)) => EmbeddingState::Ready(vector),
            Ok(Err(e)) => EmbeddingState::Failed(e.to_string()),
            Err(_) => EmbeddingState::Failed("embedding timed out".to_string()),
        };

        trace.record("classification", started, intent.category.name());
        Ok(intent)
    }

    /// Re-entry after a disambiguation pause: bind the selected author
    /// without re-running classification or resolution. The canonical
    /// name is fetched so the answer does not echo a typo from the
    /// original question.
    async fn resume_selection(
        &self,
        intent: Intent,
        selected: &str,
        trace: &mut PipelineTrace,
    ) -> Result<Intent, PipelineError> {
        let started = Instant::now();
        let candidate = self
            .resolver
            .fetch_by_id(selected)
            .await?
            .ok_or_else(|| {
                PipelineError::Resolution(format!("selected author id '{}' not found", selected))
            })?;

        let mut intent = intent.with_author(&candidate.canonical_name, &candidate.id);
        if intent.category == IntentCategory::OpenQuestion {
            intent.category = IntentCategory::AuthorMainResearchAreas;
        }

        trace.record("selection", started, &candidate.canonical_name);
        trace.set_resolution_path(ResolutionPath::Selected);
        Ok(intent)
    }

    async fn resolve_author(
        &self,
        question: &str,
        mut intent: Intent,
        trace: &mut PipelineTrace,
    ) -> Result<ResolvedIntent, PipelineError> {
        let mut fragment = intent.author.clone();
        if fragment.is_none() && intent.category.requires_author() {
            fragment = self.classifier.extract_author_name(question).await;
        }
        let Some(fragment) = fragment else {
            return Ok(ResolvedIntent::Ready(intent));
        };

        let started = Instant::now();
        let (outcome, path) = match timeout(
            self.config.graph_timeout,
            self.resolver.resolve(&fragment),
        )
        .await
        {
            Err(_) => {
                return Err(PipelineError::Resolution(
                    "author resolution timed out".to_string(),
                ))
            }
            Ok(result) => result?,
        };

        trace.set_resolution_path(path);
        match outcome {
            ResolutionOutcome::SingleMatch(candidate) => {
                trace.record("resolution", started, "single-match");
                intent = intent.with_author(&candidate.canonical_name, &candidate.id);
                if intent.category == IntentCategory::OpenQuestion {
                    intent.category = IntentCategory::AuthorPublicationsRange;
                }
                Ok(ResolvedIntent::Ready(intent))
            }
            ResolutionOutcome::MultipleMatches(candidates) => {
                trace.record("resolution", started, "multiple-matches");
                Ok(ResolvedIntent::NeedsDisambiguation {
                    intent,
                    fragment,
                    candidates,
                })
            }
            ResolutionOutcome::NotFound => {
                // Not an error: the branch decision routes author-less
                // template intents to the semantic fallback.
                trace.record("resolution", started, "not-found");
                Ok(ResolvedIntent::Ready(intent))
            }
        }
    }

    /// Branch A: templated retrieval, with semantic augmentation for
    /// topic intents and a semantic fallback when everything comes back
    /// empty.
    async fn run_templated(
        &self,
        question: &str,
        intent: &Intent,
        history: &[ChatMessage],
        embedding: &mut EmbeddingState,
        trace: &mut PipelineTrace,
    ) -> Result<TurnResponse, PipelineError> {
        // Generation, joined with topic semantic search where the intent
        // is topic-flavored.
        let started = Instant::now();
        let mut hits: Vec<SemanticHit> = Vec::new();
        let query = if intent.category.is_topic() {
            let topic = intent
                .topic
                .clone()
                .unwrap_or_else(|| question.to_string());
            let (generated, searched) = tokio::join!(
                self.generator.generate(intent),
                timeout(
                    self.config.graph_timeout,
                    self.semantic.search(&topic, self.config.topic_top_k, true),
                ),
            );
            match searched {
                Ok(Ok(found)) => hits = found,
                // Augmentation is optional evidence; its loss is not fatal
                Ok(Err(e)) => warn!("topic semantic search unavailable: {}", e),
                Err(_) => warn!("topic semantic search timed out"),
            }
            generated?
        } else {
            self.generator.generate(intent).await?
        };
        let source = match query.source {
            QuerySource::Template => "template",
            QuerySource::LlmGenerated => "llm-generated",
        };
        trace.record("generation", started, source);

        let rows = self
            .execute(&query.text, query.params.clone(), trace)
            .await?;

        // Structured retrieval came back empty: one semantic fallback
        // pass with the speculative question embedding before giving up.
        if rows.is_empty() && hits.is_empty() {
            let started = Instant::now();
            match self.question_embedding(question, embedding).await {
                Ok(vector) => {
                    match timeout(
                        self.config.graph_timeout,
                        self.semantic
                            .search_with_embedding(&vector, self.config.semantic_top_k, false),
                    )
                    .await
                    {
                        Ok(Ok(found)) => {
                            if !found.is_empty() {
                                trace.set_resolution_path(ResolutionPath::SemanticFallback);
                            }
                            hits = found;
                        }
                        Ok(Err(e)) => warn!("semantic fallback unavailable: {}", e),
                        Err(_) => warn!("semantic fallback timed out"),
                    }
                }
                Err(e) => warn!("semantic fallback skipped: {}", e),
            }
            trace.record("semantic-fallback", started, &format!("{} hits", hits.len()));
        }

        // Synthesis, with the refinement pass when structured rows are
        // empty but semantic evidence exists.
        let started = Instant::now();
        let first_pass = match timeout(
            self.config.synthesis_timeout,
            self.synthesizer
                .synthesize(question, intent, &query.text, &rows, &hits, history),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("synthesis failed, returning raw evidence: {}", e);
                render_evidence(&rows, &hits)
            }
            Err(_) => {
                warn!("synthesis timed out, returning raw evidence");
                render_evidence(&rows, &hits)
            }
        };

        let answer = if rows.is_empty() && !hits.is_empty() {
            match timeout(
                self.config.synthesis_timeout,
                self.synthesizer
                    .refine_with_semantic(question, &hits, &first_pass),
            )
            .await
            {
                Ok(Ok(refined)) => refined,
                Ok(Err(e)) => {
                    warn!("refinement pass failed, keeping first pass: {}", e);
                    first_pass
                }
                Err(_) => {
                    warn!("refinement pass timed out, keeping first pass");
                    first_pass
                }
            }
        } else {
            first_pass
        };
        trace.record("synthesis", started, "ok");

        Ok(TurnResponse {
            answer,
            intent: intent.clone(),
            query: Some(query.text),
            rows,
            hits,
            candidates: vec![],
            continuation: None,
            trace: PipelineTrace::new(), // replaced by the caller
        })
    }

    /// Branch B: answer from vector-similarity evidence and whatever
    /// authors are recoverable from it.
    async fn run_semantic_fallback(
        &self,
        question: &str,
        intent: &Intent,
        history: &[ChatMessage],
        embedding: &mut EmbeddingState,
        trace: &mut PipelineTrace,
    ) -> Result<TurnResponse, PipelineError> {
        let started = Instant::now();
        let vector = self.question_embedding(question, embedding).await?;
        let hits = match timeout(
            self.config.graph_timeout,
            self.semantic
                .search_with_embedding(&vector, self.config.semantic_top_k, false),
        )
        .await
        {
            Err(_) => {
                return Err(PipelineError::Execution(
                    "semantic search timed out".to_string(),
                ))
            }
            Ok(result) => result?,
        };
        trace.record("semantic-search", started, &format!("{} hits", hits.len()));
        trace.set_resolution_path(ResolutionPath::SemanticFallback);

        if hits.is_empty() {
            return Ok(TurnResponse {
                answer: OPEN_NO_RESULTS_ANSWER.to_string(),
                intent: intent.clone(),
                query: None,
                rows: vec![],
                hits,
                candidates: vec![],
                continuation: None,
                trace: PipelineTrace::new(),
            });
        }

        // Discovery pass: recover the authors behind the hits. Best
        // effort - the hits alone still support an answer.
        let started = Instant::now();
        let titles: Vec<String> = hits.iter().map(|h| h.title.clone()).collect();
        let (query_text, author_rows) =
            match self.generator.generate_author_discovery(&titles).await {
                Ok(query) => match self.execute(&query.text, query.params.clone(), trace).await {
                    Ok(rows) => (Some(query.text), rows),
                    Err(e) => {
                        warn!("author discovery query failed: {}", e);
                        (Some(query.text), vec![])
                    }
                },
                Err(e) => {
                    warn!("author discovery generation failed: {}", e);
                    (None, vec![])
                }
            };
        trace.record(
            "author-discovery",
            started,
            &format!("{} authors", author_rows.len()),
        );

        let started = Instant::now();
        let answer = match timeout(
            self.config.synthesis_timeout,
            self.synthesizer
                .synthesize_author_answer(question, &hits, &author_rows, history),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("synthesis failed, returning raw evidence: {}", e);
                render_evidence(&author_rows, &hits)
            }
            Err(_) => {
                warn!("synthesis timed out, returning raw evidence");
                render_evidence(&author_rows, &hits)
            }
        };
        trace.record("synthesis", started, "ok");

        Ok(TurnResponse {
            answer,
            intent: intent.clone(),
            query: query_text,
            rows: author_rows,
            hits,
            candidates: vec![],
            continuation: None,
            trace: PipelineTrace::new(),
        })
    }

    async fn execute(
        &self,
        text: &str,
        params: Params,
        trace: &mut PipelineTrace,
    ) -> Result<Vec<Row>, PipelineError> {
        let started = Instant::now();
        let rows = match timeout(self.config.graph_timeout, self.graph.run(text, params)).await {
            Err(_) => {
                return Err(PipelineError::Execution(
                    "graph query timed out".to_string(),
                ))
            }
            Ok(result) => result.map_err(PipelineError::from)?,
        };
        trace.record("execution", started, &format!("{} rows", rows.len()));
        Ok(rows)
    }

    /// The speculative embedding, materialized on demand. A failed
    /// speculative attempt is not re-tried; it surfaces here when a
    /// semantic branch actually needs it.
    async fn question_embedding(
        &self,
        question: &str,
        state: &mut EmbeddingState,
    ) -> Result<Vec<f32>, PipelineError> {
        match state {
            EmbeddingState::Ready(vector) => Ok(vector.clone()),
            EmbeddingState::Failed(message) => {
                Err(PipelineError::Execution(format!("embedding failed: {}", message)))
            }
            EmbeddingState::NotRequested => {
                let result =
                    match timeout(self.config.embed_timeout, self.embedder.embed(question)).await {
                        Err(_) => Err("embedding timed out".to_string()),
                        Ok(Err(e)) => Err(e.to_string()),
                        Ok(Ok(vector)) => Ok(vector),
                    };
                match result {
                    Ok(vector) => {
                        *state = EmbeddingState::Ready(vector.clone());
                        Ok(vector)
                    }
                    Err(message) => {
                        *state = EmbeddingState::Failed(message.clone());
                        Err(PipelineError::Execution(format!(
                            "embedding failed: {}",
                            message
                        )))
                    }
                }
            }
        }
    }
}

enum ResolvedIntent {
    Ready(Intent),
    NeedsDisambiguation {
        intent: Intent,
        fragment: String,
        candidates: Vec<AuthorCandidate>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_token_round_trips() {
        let mut intent = Intent::open_question();
        intent.category = IntentCategory::AuthorPublicationsRange;
        intent.author = Some("Smith".to_string());
        let token = ContinuationToken {
            intent,
            question: "what did Smith publish?".to_string(),
        };

        let json = serde_json::to_string(&token).unwrap();
        let back: ContinuationToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_follow_up_request_builder() {
        let token = ContinuationToken {
            intent: Intent::open_question(),
            question: "who is smith".to_string(),
        };
        let request = TurnRequest::new("").with_selection("author-142", token.clone());
        assert_eq!(request.selected_author_id.as_deref(), Some("author-142"));
        assert_eq!(request.continuation, Some(token));
    }
}
