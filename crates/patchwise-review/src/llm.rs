use std::time::Duration;

use async_trait::async_trait;
use patchwise_core::{LlmConfig, PatchwiseError};
use serde::{Deserialize, Serialize};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Something that turns a prompt into review text.
///
/// The pipeline only sees this trait, so tests substitute canned responses.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response for `prompt`.
    ///
    /// `Ok(None)` means the provider answered with no text, which callers
    /// treat as "no suggestions".
    async fn generate(&self, prompt: &str) -> Result<Option<String>, PatchwiseError>;

    /// Model identifier, for logs and reports.
    fn model(&self) -> &str;
}

/// A message in a chat conversation with an OpenAI-compatible endpoint.
///
/// # Examples
///
/// ```
/// use patchwise_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Review this diff".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Supported generation backends.
///
/// # Examples
///
/// ```
/// use patchwise_review::llm::Provider;
///
/// assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
/// assert!("bard".parse::<Provider>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Generative Language `generateContent`.
    Gemini,
    /// Any `/v1/chat/completions` endpoint: OpenAI, Ollama, vLLM, LiteLLM.
    OpenAi,
}

impl std::str::FromStr for Provider {
    type Err = PatchwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            other => Err(PatchwiseError::Config(format!(
                "unknown LLM provider '{other}', expected gemini or openai"
            ))),
        }
    }
}

/// HTTP client for the configured generation provider.
///
/// # Examples
///
/// ```
/// use patchwise_core::LlmConfig;
/// use patchwise_review::llm::{LlmClient, TextGenerator};
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gemini-2.0-flash");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PatchwiseError::Config`] for an unknown provider and
    /// [`PatchwiseError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, PatchwiseError> {
        let provider = config.provider.parse()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PatchwiseError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider,
            config: config.clone(),
        })
    }

    /// Which backend requests go to.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    async fn gemini(&self, prompt: &str) -> Result<Option<String>, PatchwiseError> {
        let base_url = self.config.base_url.as_deref().unwrap_or(GEMINI_BASE_URL);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            self.config.model
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-goog-api-key", api_key);
        }

        let response_body = send_json(request.json(&body)).await?;
        if response_body.get("candidates").is_none() {
            tracing::warn!(
                feedback = %response_body.get("promptFeedback").unwrap_or(&serde_json::Value::Null),
                "generation returned no candidates"
            );
        }
        Ok(extract_gemini_text(&response_body))
    }

    async fn chat(&self, prompt: &str) -> Result<Option<String>, PatchwiseError> {
        let base_url = self.config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        let messages = vec![ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        }];
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response_body = send_json(request.json(&body)).await?;
        Ok(extract_chat_text(&response_body))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, PatchwiseError> {
        tracing::debug!(
            provider = ?self.provider,
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "sending generation request"
        );
        match self.provider {
            Provider::Gemini => self.gemini(prompt).await,
            Provider::OpenAi => self.chat(prompt).await,
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, PatchwiseError> {
    let response = request
        .send()
        .await
        .map_err(|e| PatchwiseError::Llm(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(PatchwiseError::Llm(format!(
            "LLM API error {status}: {body_text}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| PatchwiseError::Llm(format!("failed to parse response: {e}")))
}

/// Concatenate the text parts of the first candidate of a
/// `generateContent` response. Blank text yields `None`.
///
/// # Examples
///
/// ```
/// use patchwise_review::llm::extract_gemini_text;
///
/// let body = serde_json::json!({
///     "candidates": [{ "content": { "parts": [{ "text": "line 3: typo" }] } }]
/// });
/// assert_eq!(extract_gemini_text(&body).as_deref(), Some("line 3: typo"));
/// ```
pub fn extract_gemini_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    non_blank(text)
}

/// Extract the first choice's message content of a chat completion
/// response. Blank text yields `None`.
pub fn extract_chat_text(body: &serde_json::Value) -> Option<String> {
    let content = body
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;

    non_blank(content.to_string())
}

fn non_blank(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
