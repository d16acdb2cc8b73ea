use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_core::config::LlmConfig;
use parley_core::domain::message::ContextMessage;

const RETRY_BASE_DELAY_MS: u64 = 250;
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion request timed out")]
    Timeout,
    #[error("completion transport failure: {0}")]
    Transport(String),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    #[error("completion response contained no choices")]
    EmptyChoices,
    #[error("completion client is not configured: {0}")]
    NotConfigured(String),
}

impl CompletionError {
    /// Timeouts, transport failures, throttling and server errors are worth
    /// another attempt. Everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::EmptyChoices | Self::NotConfigured(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ContextMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ContextMessage>) -> Self {
        Self { model: model.into(), messages }
    }
}

/// Chat-completion collaborator. Returns the content of the first choice.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ContextMessage],
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client (OpenRouter, OpenAI, Ollama).
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    requires_api_key: bool,
    app_title: String,
    max_retries: u32,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CompletionError::NotConfigured(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: chat_completions_url(config.effective_base_url()),
            api_key: config.api_key.clone(),
            requires_api_key: config.provider.requires_api_key(),
            app_title: config.app_title.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("X-Title", &self.app_title)
            .json(&ChatRequestBody { model: &request.model, messages: &request.messages });

        match &self.api_key {
            Some(key) => builder = builder.bearer_auth(key.expose_secret()),
            None if self.requires_api_key => {
                return Err(CompletionError::NotConfigured("missing llm api key".to_string()));
            }
            None => {}
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            });
        }

        first_choice_content(&body)
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        event_name = "llm.completion.retry",
                        model = %request.model,
                        attempt,
                        error = %error,
                        "retrying completion request"
                    );
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * u64::from(attempt));
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn map_transport_error(error: reqwest::Error) -> CompletionError {
    if error.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Transport(error.to_string())
    }
}

/// Extracts `choices[0].message.content` from a chat-completions response body.
pub fn first_choice_content(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponseBody = serde_json::from_str(body)
        .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;

    let choice = parsed
        .choices
        .ok_or_else(|| CompletionError::MalformedResponse("missing `choices`".to_string()))?
        .into_iter()
        .next()
        .ok_or(CompletionError::EmptyChoices)?;

    choice
        .message
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            CompletionError::MalformedResponse(
                "missing or blank `choices[0].message.content`".to_string(),
            )
        })
}
