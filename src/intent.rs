//! Intent schema and classification
//!
//! The classifier maps a raw question (plus conversation history) into a
//! structured intent: a category from a CLOSED set plus extracted slots.
//! The intent represents WHAT the user asked, not HOW to answer it - the
//! orchestrator decides the execution branch from the category alone.
//!
//! Department mentions are canonicalized against a fixed controlled
//! vocabulary via a pure alias table, so the behavior is data-driven and
//! testable instead of being pattern-matching scattered through branches.

use crate::ai::{prompts, utils, ChatMessage, LlmClient};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// All question categories the pipeline understands.
///
/// This is a closed set - the classifier can only produce these. Anything
/// else degrades to `OpenQuestion`, which routes to the semantic-fallback
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    AuthorPublicationsRange,
    AuthorLatestPublication,
    AuthorTopVenue,
    AuthorPairSharedPublications,
    AuthorTopCoauthors,
    AuthorTopicPublicationCount,
    AuthorTopicExtent,
    AuthorMainResearchAreas,
    AuthorTopicSynergy,
    AuthorInstitutionCollabFrequency,
    AuthorTopicPeers,
    DepartmentTopicTrends,
    OpenQuestion,
}

impl IntentCategory {
    /// Category name for logging and trace records
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthorPublicationsRange => "AUTHOR_PUBLICATIONS_RANGE",
            Self::AuthorLatestPublication => "AUTHOR_LATEST_PUBLICATION",
            Self::AuthorTopVenue => "AUTHOR_TOP_VENUE",
            Self::AuthorPairSharedPublications => "AUTHOR_PAIR_SHARED_PUBLICATIONS",
            Self::AuthorTopCoauthors => "AUTHOR_TOP_COAUTHORS",
            Self::AuthorTopicPublicationCount => "AUTHOR_TOPIC_PUBLICATION_COUNT",
            Self::AuthorTopicExtent => "AUTHOR_TOPIC_EXTENT",
            Self::AuthorMainResearchAreas => "AUTHOR_MAIN_RESEARCH_AREAS",
            Self::AuthorTopicSynergy => "AUTHOR_TOPIC_SYNERGY",
            Self::AuthorInstitutionCollabFrequency => "AUTHOR_INSTITUTION_COLLAB_FREQUENCY",
            Self::AuthorTopicPeers => "AUTHOR_TOPIC_PEERS",
            Self::DepartmentTopicTrends => "DEPARTMENT_TOPIC_TRENDS",
            Self::OpenQuestion => "OPEN_QUESTION",
        }
    }

    /// Whether this category maps to a known structured query shape.
    pub fn is_template(&self) -> bool {
        !matches!(self, Self::OpenQuestion)
    }

    /// Topic-flavored categories also consume semantic hits alongside
    /// their structured rows.
    pub fn is_topic(&self) -> bool {
        matches!(
            self,
            Self::AuthorTopicPublicationCount
                | Self::AuthorTopicExtent
                | Self::AuthorTopicSynergy
                | Self::AuthorTopicPeers
                | Self::DepartmentTopicTrends
        )
    }

    /// Template categories that cannot run without a resolved author id.
    pub fn requires_author(&self) -> bool {
        self.is_template() && !matches!(self, Self::DepartmentTopicTrends)
    }
}

/// Department slot: a single department, or an umbrella expanded into a
/// list of concrete ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepartmentFilter {
    One(String),
    Many(Vec<String>),
}

impl DepartmentFilter {
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::One(d) => vec![d.clone()],
            Self::Many(ds) => ds.clone(),
        }
    }
}

/// A classified question: category plus extracted slots. Produced once
/// per question and read-only afterward (resolution fills `author_id`
/// through `with_author`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "intent")]
    pub category: IntentCategory,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub second_author: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub department: Option<DepartmentFilter>,
    #[serde(default)]
    pub start_year: Option<i64>,
    #[serde(default)]
    pub end_year: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Filled by resolution or disambiguation selection, never by the
    /// classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

impl Intent {
    /// Degraded catch-all intent for unclassifiable questions.
    pub fn open_question() -> Self {
        Self {
            category: IntentCategory::OpenQuestion,
            author: None,
            second_author: None,
            topic: None,
            department: None,
            start_year: None,
            end_year: None,
            scope: None,
            author_id: None,
        }
    }

    /// Expand umbrella department values against the controlled
    /// vocabulary. All other fields pass through unchanged.
    pub fn normalize(mut self) -> Self {
        if let Some(DepartmentFilter::One(dept)) = &self.department {
            self.department = Some(departments::canonicalize(dept));
        }
        self
    }

    /// Bind a resolved author (canonical name + id).
    pub fn with_author(mut self, name: &str, id: &str) -> Self {
        self.author = Some(name.to_string());
        self.author_id = Some(id.to_string());
        self
    }

    /// Whether every slot the category needs is present. Author-based
    /// categories require the resolved id, not just a name fragment.
    pub fn has_required_slots(&self) -> bool {
        if self.category.requires_author() && self.author_id.is_none() {
            return false;
        }
        if self.category == IntentCategory::AuthorPairSharedPublications
            && self.second_author.is_none()
        {
            return false;
        }
        if self.category == IntentCategory::DepartmentTopicTrends && self.department.is_none() {
            return false;
        }
        true
    }
}

/// Department canonicalization: alias table over a fixed vocabulary.
pub mod departments {
    use super::DepartmentFilter;

    /// Umbrella mentions that expand to the whole engineering faculty.
    pub const ENGINEERING_ALIASES: [&str; 6] = [
        "engineering",
        "uofa engineering",
        "ualberta engineering",
        "faculty of engineering",
        "faculty engineering",
        "engg",
    ];

    /// The controlled department vocabulary.
    pub const ENGINEERING_DEPARTMENTS: [&str; 5] = [
        "Electrical and Computer Engineering",
        "Mechanical Engineering",
        "Civil and Environmental Engineering",
        "Chemical and Materials Engineering",
        "Biomedical Engineering",
    ];

    /// Canonicalize a free-form department mention. Umbrella aliases
    /// expand to the full list; case-insensitive substring matches map to
    /// their canonical form; unmatched mentions pass through verbatim.
    pub fn canonicalize(mention: &str) -> DepartmentFilter {
        let norm = mention.trim().to_lowercase();

        if ENGINEERING_ALIASES.contains(&norm.as_str()) {
            return DepartmentFilter::Many(
                ENGINEERING_DEPARTMENTS.iter().map(|d| d.to_string()).collect(),
            );
        }

        for canonical in ENGINEERING_DEPARTMENTS {
            if canonical.to_lowercase().contains(&norm) {
                return DepartmentFilter::One(canonical.to_string());
            }
        }

        DepartmentFilter::One(mention.to_string())
    }
}

/// LLM-backed intent classifier.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify a question. Always returns an intent: output that does
    /// not parse against the closed schema degrades to `OpenQuestion`.
    /// An unreachable model is a hard classification failure - it is NOT
    /// downgraded to a default intent, because a wrong default would risk
    /// confidently wrong answers.
    pub async fn classify(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<Intent, PipelineError> {
        let raw = self
            .llm
            .chat(prompts::INTENT_SYSTEM_PROMPT, question, history)
            .await
            .map_err(|e| PipelineError::Classification(e.to_string()))?;

        let cleaned = utils::strip_code_fences(&raw);
        let candidate = utils::extract_json_object(&cleaned).unwrap_or(cleaned.as_str());

        let intent = match serde_json::from_str::<Intent>(candidate) {
            Ok(intent) => intent,
            Err(e) => {
                warn!("intent output did not parse ({}); degrading to open question", e);
                Intent::open_question()
            }
        };

        let intent = intent.normalize();
        debug!(category = intent.category.name(), "classified intent");
        Ok(intent)
    }

    /// Fallback name extraction for author-flavored questions where the
    /// classifier left the author slot empty. Extraction problems are
    /// logged and swallowed - this pass is best-effort.
    pub async fn extract_author_name(&self, question: &str) -> Option<String> {
        match self
            .llm
            .chat(prompts::NAME_EXTRACTION_PROMPT, question, &[])
            .await
        {
            Ok(raw) => {
                let name = raw.trim().to_string();
                // Very short outputs are noise, not names
                (name.len() > 3).then_some(name)
            }
            Err(e) => {
                warn!("name extraction failed: {}", e);
                None
            }
        }
    }
}
