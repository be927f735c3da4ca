//! Recursive, model-driven topic research.
//!
//! `delve-rs` takes a starting question, expands it into parallel search
//! queries, extracts short factual "learnings" from the results, and
//! recursively deepens promising directions until a depth budget runs out.
//! The accumulated learnings and visited URLs then feed a final report or a
//! short answer.
//!
//! The core is the [`Researcher`](research::Researcher), a bounded-concurrency
//! fan-out/recursion engine, plus the [`StructuredOutput`](structured::StructuredOutput)
//! pipeline that turns untrusted model text into schema-shaped JSON without
//! ever failing. Every remote call goes through one retry wrapper,
//! [`Resilient`](api::retry::Resilient).
//!
//! # Getting started
//!
//! ```ignore
//! use delve_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = DelveConfig::from_env().map_err(|e| e.to_string())?;
//!     let model = Arc::new(ChatClient::new(&config.model).map_err(|e| e.to_string())?);
//!     let search = Arc::new(FirecrawlClient::new(&config.search).map_err(|e| e.to_string())?);
//!
//!     let researcher = Researcher::new(model, search, &config)
//!         .with_observer(Arc::new(LoggingObserver));
//!
//!     let result = researcher
//!         .research("impact of caffeine on sleep", 4, 2)
//!         .await
//!         .map_err(|e| e.to_string())?;
//!     let report = researcher
//!         .write_report("impact of caffeine on sleep", &result.learnings, &result.visited_urls)
//!         .await;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a research tree:** [`Researcher::research`](research::Researcher::research).
//!   Tune concurrency, timeouts and caps with [`DelveConfig`](config::DelveConfig).
//! - **Plug in a different model or search backend:** implement
//!   [`LanguageModel`](model::LanguageModel) or
//!   [`SearchProvider`](search::SearchProvider). Test doubles live in [`mock`].
//! - **Watch progress:** implement [`ProgressObserver`](research::progress::ProgressObserver),
//!   or use [`LoggingObserver`](research::progress::LoggingObserver) /
//!   [`FnObserver`](research::progress::FnObserver).
//! - **Get JSON out of a model:** [`StructuredOutput::obtain`](structured::StructuredOutput::obtain)
//!   and the stand-alone [`repair`](structured::repair::repair) cascade.
//! - **Keep prompts under budget:** [`PromptBudget`](context::PromptBudget).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`research`] | Orchestrator, query planner, result extractor, progress, report/answer writers |
//! | [`structured`] | JSON repair cascade, schema defaults and validation |
//! | [`api`] | Retry with exponential backoff |
//! | [`context`] | Token estimation and prompt trimming |
//! | [`model`] / [`search`] | Remote capability traits and their HTTP clients |
//! | [`config`] / [`error`] | Configuration and error types |

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod mock;
pub mod model;
pub mod prelude;
pub mod research;
pub mod search;
pub mod structured;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::ModelConfig;
use crate::error::{CallError, ConfigError};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// OpenRouter's chat-completions endpoint.
pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for all generations.
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types and
/// the schema hints sent to the model.
///
/// # Example
///
/// ```
/// use delve_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Answer {
///     exact_answer: String,
///     #[serde(default)]
///     confidence: Option<f64>,
/// }
///
/// let schema = json_schema_for::<Answer>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"exact_answer".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible). Unused optional fields
/// are omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
}

/// JSON output mode.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonObject,
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Interpret a chat-completions response body.
///
/// A body that does not decode, carries an in-band `error`, or has no
/// choice with content is transient: some providers return 200 with an
/// error object while overloaded, and another attempt usually succeeds.
pub fn parse_completion(status: u16, text: &str) -> Result<ChatCompletion, CallError> {
    if !(200..300).contains(&status) {
        return Err(CallError::from_status(status, text));
    }

    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| CallError::Transient(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        // In-band errors may carry an HTTP-like code.
        if let Some(code) = err.code.as_ref().and_then(|c| c.as_u64()) {
            if let Ok(code) = u16::try_from(code) {
                return Err(CallError::from_status(code, &err.message));
            }
        }
        return Err(CallError::Transient(format!("provider error: {}", err.message)));
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| CallError::Transient("response had no choices".into()))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| CallError::Transient("response had no content".into()))?;

    Ok(ChatCompletion {
        content,
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API
/// (OpenRouter by default).
///
/// Performs exactly one attempt per call; retries are the caller's job
/// (see [`Resilient`](api::retry::Resilient)).
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatClient {
    /// Build a client from configuration.
    pub fn new(config: &ModelConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("OPENROUTER_KEY"));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("delve-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Assemble a request for this client's model.
    pub fn request(
        &self,
        system: &str,
        prompt: &str,
        temperature: Option<f32>,
        json_mode: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature,
            response_format: json_mode.then(ResponseFormat::json_object),
        }
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, CallError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, json={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.response_format.is_some(),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "delve-rs")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let completion = parse_completion(status.as_u16(), &text)?;
        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }
        Ok(completion)
    }
}
