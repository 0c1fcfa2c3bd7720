use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{LLMConfig, LocalModelConfig, SettingsStore};
use crate::errors::{classify_transport_error, AIError};
use crate::models::{ChatMessage, ChatRole};
use crate::provider_selector::ProviderKind;
use crate::log_llm_operation;

/// Common message structure for chat-completion requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: ChatRole::System.as_str().to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: ChatRole::User.as_str().to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&ChatMessage> for LLMMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

// ============================================================================
// Hosted provider
// ============================================================================

/// OpenAI-compatible chat-completion client for the hosted model
#[derive(Debug, Clone)]
pub struct HostedProvider {
    client: Client,
    base_url: String,
    app_title: String,
    app_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct HostedRequest<'a> {
    model: &'a str,
    messages: &'a [LLMMessage],
}

#[derive(Debug, Clone, Deserialize)]
struct HostedResponse {
    #[serde(default)]
    choices: Vec<HostedChoice>,
    #[serde(default)]
    error: Option<HostedError>,
}

#[derive(Debug, Clone, Deserialize)]
struct HostedChoice {
    message: Option<HostedMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct HostedMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HostedError {
    message: Option<String>,
}

impl HostedProvider {
    pub fn new(config: &LLMConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build configured HTTP client, using defaults");
                Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_title: config.app_title.clone(),
            app_url: config.app_url.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Issue one chat-completion call and return the first choice's content
    pub async fn complete(
        &self,
        api_key: &str,
        model: &str,
        messages: &[LLMMessage],
    ) -> Result<String, AIError> {
        let request_body = HostedRequest { model, messages };

        info!(
            provider = "hosted",
            model = %model,
            base_url = %self.base_url,
            message_count = messages.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.app_url)
            .header("X-Title", &self.app_title)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "hosted",
                status = %status,
                error = %truncate(&error_text, 300),
                "LLM API request failed"
            );
            return Err(AIError::status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let envelope: HostedResponse = serde_json::from_str(&body).map_err(|e| {
            error!(provider = "hosted", error = %e, "Failed to decode LLM response envelope");
            AIError::InvalidResponse
        })?;

        if let Some(provider_error) = envelope.error {
            let message = provider_error
                .message
                .unwrap_or_else(|| "provider reported an error".to_string());
            error!(provider = "hosted", error = %message, "Provider reported an error");
            return Err(AIError::ApiError(message));
        }

        let content = envelope
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|message| message.content))
            .filter(|content| !content.trim().is_empty())
            .ok_or(AIError::InvalidResponse)?;

        info!(
            provider = "hosted",
            response_length = content.len(),
            "Successfully received LLM response"
        );

        Ok(content)
    }
}

// ============================================================================
// Local provider
// ============================================================================

/// Capability interface for an on-device model.
///
/// A session is opened with the system instructions and then fed user text;
/// it already holds the instruction-level context.
#[async_trait]
pub trait LocalModelProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    /// Platform / capability probe. Must be cheap and must not fail.
    fn is_available(&self) -> bool;

    async fn open_session(&self, instructions: &str) -> Result<Box<dyn LocalSession>, AIError>;
}

#[async_trait]
pub trait LocalSession: Send + Sync {
    async fn respond(&self, user_text: &str) -> Result<String, AIError>;
}

/// Stand-in for hosts without an on-device model
#[derive(Debug, Clone, Default)]
pub struct UnavailableLocalModel;

#[async_trait]
impl LocalModelProvider for UnavailableLocalModel {
    fn provider_name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn open_session(&self, _instructions: &str) -> Result<Box<dyn LocalSession>, AIError> {
        Err(AIError::ApiError("local model unavailable".to_string()))
    }
}

/// Local model served by an Ollama-compatible daemon on this machine
#[derive(Debug, Clone)]
pub struct OllamaLocalModel {
    client: Client,
    base_url: Option<String>,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<LLMMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    message: Option<HostedMessage>,
    #[serde(default)]
    error: Option<String>,
}

struct OllamaSession {
    client: Client,
    url: String,
    model: String,
    instructions: String,
}

impl OllamaLocalModel {
    pub fn new(config: &LocalModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build local model HTTP client, using defaults");
                Client::new()
            });

        Self {
            client,
            base_url: config.url.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LocalModelProvider for OllamaLocalModel {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn is_available(&self) -> bool {
        self.base_url.is_some()
    }

    async fn open_session(&self, instructions: &str) -> Result<Box<dyn LocalSession>, AIError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| AIError::ApiError("local model unavailable".to_string()))?;

        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: self.model.clone(),
            instructions: instructions.to_string(),
        }))
    }
}

#[async_trait]
impl LocalSession for OllamaSession {
    async fn respond(&self, user_text: &str) -> Result<String, AIError> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: vec![LLMMessage::system(&self.instructions), LLMMessage::user(user_text)],
            stream: false,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(AIError::status(response.status().as_u16()));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|_| AIError::InvalidResponse)?;

        if let Some(message) = parsed.error {
            return Err(AIError::ApiError(message));
        }

        parsed
            .message
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AIError::InvalidResponse)
    }
}

// ============================================================================
// Pacing
// ============================================================================

/// Randomized per-call delay applied before hosted requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 1000,
        }
    }
}

impl PacingPolicy {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for `delay` unless `cancel` fires first. Returns false if the wait was cut short.
    pub async fn wait(&self, delay: Duration, cancel: Option<&CancellationToken>) -> bool {
        if delay.is_zero() {
            return true;
        }

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => true,
                    _ = token.cancelled() => {
                        debug!(delay_ms = delay.as_millis() as u64, "Pacing delay skipped after cancellation");
                        false
                    }
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

// ============================================================================
// Request executor
// ============================================================================

/// Turns prompts into raw model output for the chosen provider
#[derive(Clone)]
pub struct RequestExecutor {
    settings: Arc<dyn SettingsStore>,
    hosted: HostedProvider,
    local: Arc<dyn LocalModelProvider>,
    pacing: PacingPolicy,
}

impl RequestExecutor {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        hosted: HostedProvider,
        local: Arc<dyn LocalModelProvider>,
        pacing: PacingPolicy,
    ) -> Self {
        Self {
            settings,
            hosted,
            local,
            pacing,
        }
    }

    pub fn local_model(&self) -> &Arc<dyn LocalModelProvider> {
        &self.local
    }

    /// Single-turn call: one system prompt, one user prompt
    pub async fn execute(
        &self,
        provider: ProviderKind,
        system: &str,
        user: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, AIError> {
        log_llm_operation!(start, "execute", provider = provider, prompt_length = user.len());
        let started = Instant::now();

        let result = match provider {
            ProviderKind::Hosted => {
                let messages = vec![LLMMessage::system(system), LLMMessage::user(user)];
                self.execute_hosted(&messages, cancel).await
            }
            ProviderKind::Local => self.execute_local(system, user).await,
        };

        self.log_outcome("execute", provider, started, &result);
        result
    }

    /// Multi-turn call. The hosted model receives the whole history; a local
    /// session receives only the latest user turn.
    pub async fn execute_conversation(
        &self,
        provider: ProviderKind,
        system: &str,
        turns: &[ChatMessage],
        cancel: Option<&CancellationToken>,
    ) -> Result<String, AIError> {
        let prompt_length = turns.iter().map(|turn| turn.content.len()).sum::<usize>();
        log_llm_operation!(start, "execute_conversation", provider = provider, prompt_length = prompt_length);
        let started = Instant::now();

        let result = match provider {
            ProviderKind::Hosted => {
                let mut messages = Vec::with_capacity(turns.len() + 1);
                messages.push(LLMMessage::system(system));
                messages.extend(
                    turns
                        .iter()
                        .filter(|turn| turn.role != ChatRole::System)
                        .map(LLMMessage::from),
                );
                self.execute_hosted(&messages, cancel).await
            }
            ProviderKind::Local => {
                let latest = turns
                    .iter()
                    .rev()
                    .find(|turn| turn.role == ChatRole::User)
                    .map(|turn| turn.content.as_str())
                    .ok_or_else(|| AIError::ApiError("conversation has no user message".to_string()))?;
                self.execute_local(system, latest).await
            }
        };

        self.log_outcome("execute_conversation", provider, started, &result);
        result
    }

    async fn execute_hosted(
        &self,
        messages: &[LLMMessage],
        cancel: Option<&CancellationToken>,
    ) -> Result<String, AIError> {
        let api_key = self
            .settings
            .hosted_api_key()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(AIError::MissingCredential)?;

        let delay = self.pacing.sample(&mut rand::rng());
        self.pacing.wait(delay, cancel).await;

        let model = self.settings.hosted_model_name();
        self.hosted.complete(&api_key, &model, messages).await
    }

    async fn execute_local(&self, system: &str, user: &str) -> Result<String, AIError> {
        let backend = self.local.provider_name();
        if !self.local.is_available() {
            log_llm_operation!(warn, "execute_local", format!("{} backend is not available", backend));
            return Err(AIError::ApiError("local model unavailable".to_string()));
        }

        debug!(backend = %backend, "Opening local model session");
        let session = self.local.open_session(system).await?;
        session.respond(user).await
    }

    fn log_outcome(
        &self,
        operation: &str,
        provider: ProviderKind,
        started: Instant,
        result: &Result<String, AIError>,
    ) {
        match result {
            Ok(content) => {
                log_llm_operation!(
                    success,
                    operation,
                    provider = provider,
                    duration_ms = started.elapsed().as_millis() as u64,
                    response_length = content.len()
                );
            }
            Err(e) => {
                log_llm_operation!(error, operation, provider = provider, error = e);
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}
