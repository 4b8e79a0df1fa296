//! Language-model and embedding client abstractions
//!
//! The pipeline consumes two narrow capabilities: chat completion (used
//! for classification, query generation, and synthesis as three distinct
//! prompt contracts) and text embedding (used for semantic search). Both
//! are traits so tests and alternative hosts can substitute their own
//! implementations; `OpenAiClient` is the production implementation.

mod openai;
pub mod prompts;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One prior message of conversation context, OpenAI chat format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Errors from the chat/embedding services.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key is missing or empty")]
    Authentication,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Chat-completion client. One call, optional conversation history.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a chat completion: fixed system instructions, dynamic user
    /// content, and optional prior turns inserted between them.
    async fn chat(
        &self,
        system_prompt: &str,
        user_content: &str,
        history: &[ChatMessage],
    ) -> Result<String, LlmError>;
}

/// Text-embedding client for the vector index.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a piece of text into the index's fixed-dimension space.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// LLM service configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the service
    pub api_key: String,

    /// Chat model name
    pub chat_model: String,

    /// Embedding model name
    pub embed_model: String,

    /// Base URL for the OpenAI-compatible API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-large".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl LlmConfig {
    /// Create a new configuration with an explicit key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Set the chat model
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the embedding model
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the base URL (for compatible proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Response cleanup helpers shared by the classifier and query generator.
pub mod utils {
    /// Strip markdown code fences from model output. Models wrap Cypher
    /// and JSON in ``` blocks despite instructions not to.
    pub fn strip_code_fences(raw: &str) -> String {
        let mut text = raw.trim();
        if let Some(rest) = text.strip_prefix("```") {
            // Drop the language tag on the opening fence, if any
            let rest = match rest.find('\n') {
                Some(idx) => &rest[idx + 1..],
                None => rest,
            };
            text = rest;
        }
        if let Some(rest) = text.strip_suffix("```") {
            text = rest;
        }
        text.trim().to_string()
    }

    /// Extract the first JSON object from model output, tolerating prose
    /// around it.
    pub fn extract_json_object(raw: &str) -> Option<&str> {
        let start = raw.find('{')?;
        let mut depth = 0usize;
        for (offset, c) in raw[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&raw[start..start + offset + 1]);
                    }
                }
                _ => {}
            }
        }
        None
    }

}
