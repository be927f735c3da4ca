//! Error types for remote calls, configuration, and top-level research runs.
//!
//! Most failures inside a research run never reach the caller: malformed
//! model output is repaired by [`structured`](crate::structured), and failed
//! branches degrade to empty contributions. What remains is modelled here:
//!
//! - [`CallError`]: the outcome of one remote call, or of a retry sequence
//!   that gave up. Produced by [`LanguageModel`](crate::model::LanguageModel)
//!   and [`SearchProvider`](crate::search::SearchProvider) implementations and
//!   surfaced by [`Resilient`](crate::api::retry::Resilient).
//! - [`ConfigError`]: missing credentials or unparsable settings, raised when
//!   clients are constructed.
//! - [`ResearchError`]: caller misuse of the top-level entry points.

use thiserror::Error;

/// Failure of a remote generation or search call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallError {
    /// The provider signalled rate limiting (HTTP 429) on a single attempt.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network failure, server error, or malformed provider response.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable failure such as rejected credentials.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Rate limiting persisted through every retry.
    #[error("rate limited, retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// A transient failure persisted through every retry.
    #[error("remote call failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl CallError {
    /// Classify a non-success HTTP status from a provider.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", preview(body, 300));
        match status {
            429 => CallError::RateLimited(detail),
            408 | 500..=599 => CallError::Transient(detail),
            401 | 403 => CallError::Fatal(format!("credentials rejected ({detail})")),
            _ => CallError::Fatal(detail),
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::RateLimited(_) | CallError::Transient(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            CallError::RateLimited(_) | CallError::RateLimitExhausted { .. }
        )
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return CallError::from_status(status.as_u16(), &e.to_string());
        }
        CallError::Transient(format!("request failed: {e}"))
    }
}

/// Invalid or incomplete configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required credential is not configured.
    #[error("missing credential: set the {0} environment variable")]
    MissingCredential(&'static str),

    /// A setting could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors returned by the top-level research entry points.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResearchError {
    /// The caller supplied an empty or whitespace-only query.
    #[error("query is required")]
    EmptyQuery,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn preview(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() > max_chars {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
