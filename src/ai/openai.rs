//! OpenAI-compatible API client
//!
//! Implements both `LlmClient` (chat completions) and `EmbeddingClient`
//! (embeddings) against the same endpoint family, sharing one reqwest
//! client and configuration.

use super::{ChatMessage, EmbeddingClient, LlmClient, LlmConfig, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Client for the OpenAI chat-completions and embeddings endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Create a new client. Fails fast on a missing API key rather than
    /// producing confusing 401s mid-pipeline.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let url = format!("{}/{}", self.config.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("API error: {} - {}", status, text);
            return Err(LlmError::Api(format!("HTTP {}: {}", status, text)));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        system_prompt: &str,
        user_content: &str,
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        // system + recent history + current user message
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user_content));

        let body = ChatRequest {
            model: &self.config.chat_model,
            messages,
        };

        let text = self.post_json("chat/completions", &body).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                LlmError::InvalidResponse("chat response had no message text".to_string())
            })?;

        Ok(content)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let body = EmbeddingRequest {
            model: &self.config.embed_model,
            input: text,
        };

        let raw = self.post_json("embeddings", &body).await?;
        let parsed: EmbeddingResponse = serde_json::from_str(&raw)?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("embedding response had no data".to_string()))
    }
}
