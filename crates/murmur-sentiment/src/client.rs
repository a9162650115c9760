//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use murmur_core::AppConfig;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 150;

/// The external classification call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model name reported in analysis reports.
    fn model(&self) -> &str;

    /// Send one system + user exchange and return the raw reply text.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::RateLimited`] for quota/rate-limit replies and
    /// another [`CompletionError`] variant for every other failure.
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatClient {
    /// # Errors
    ///
    /// Returns [`CompletionError::Request`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from config. `Ok(None)` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Request`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, CompletionError> {
        config
            .llm_api_key
            .as_deref()
            .map(|key| {
                Self::new(
                    &config.llm_base_url,
                    &config.llm_model,
                    key,
                    Duration::from_secs(config.llm_timeout_secs),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || mentions_quota(&body) {
                return Err(CompletionError::RateLimited(format!(
                    "status {}: {}",
                    status.as_u16(),
                    truncate(&body)
                )));
            }
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: truncate(&body).to_string(),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("no choices in reply".to_string()))
    }
}

fn mentions_quota(body: &str) -> bool {
    body.contains("RESOURCE_EXHAUSTED") || body.to_ascii_lowercase().contains("quota")
}

fn truncate(body: &str) -> &str {
    murmur_core::text::truncate_chars(body, 200)
}
