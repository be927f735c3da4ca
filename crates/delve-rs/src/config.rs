//! Configuration for research runs and the remote clients they use.
//!
//! Everything a run needs is carried by an explicit [`DelveConfig`] passed
//! to constructors; nothing reads ambient global state after start-up.
//! [`DelveConfig::from_env`] is the one place environment variables are read.
//!
//! # Examples
//!
//! Loading from the environment and overriding a few settings:
//!
//! ```ignore
//! let config = DelveConfig::from_env()?
//!     .with_model("openai/gpt-4o-mini")
//!     .with_concurrency(4);
//! ```
//!
//! Building by hand (tests, embedding):
//!
//! ```
//! use delve_rs::config::{ConcurrencyMode, DelveConfig, ModelConfig};
//!
//! let config = DelveConfig::new(ModelConfig::new("sk-test"))
//!     .with_concurrency_mode(ConcurrencyMode::Shared);
//! assert_eq!(config.research.concurrency, 2);
//! ```

use std::time::Duration;

use crate::api::retry::RetryConfig;
use crate::context::budget::DEFAULT_CONTEXT_TOKENS;
use crate::error::ConfigError;
use crate::{DEFAULT_API_URL, DEFAULT_MODEL};

/// Default Firecrawl endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://api.firecrawl.dev";

/// Branches allowed in flight per recursion level.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Deadline for one learning-extraction call.
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Recursion depth accepted from callers before clamping.
pub const MAX_DEPTH: usize = 8;

/// Breadth accepted from callers before clamping.
pub const MAX_BREADTH: usize = 16;

// ── Model ──────────────────────────────────────────────────────────

/// Settings for the chat-completions client.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Full chat-completions endpoint URL. Default: OpenRouter.
    pub api_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Maximum tokens per response (0 = provider default).
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 0,
            request_timeout: Duration::from_secs(120),
        }
    }
}

// ── Search ─────────────────────────────────────────────────────────

/// Settings for the web-search client.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the Firecrawl API (hosted or self-hosted).
    pub base_url: String,
    /// API key. Self-hosted instances typically need none.
    pub api_key: Option<String>,
    /// Results requested per query.
    pub limit: usize,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SEARCH_URL.to_string(),
            api_key: None,
            limit: 5,
            request_timeout: Duration::from_secs(60),
        }
    }
}

// ── Research ───────────────────────────────────────────────────────

/// How the per-branch concurrency limit is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// Each recursion level gets its own limiter. Nested levels run
    /// concurrently, so total in-flight calls can exceed the nominal cap.
    #[default]
    PerLevel,
    /// One limiter shared by the whole tree. A branch holds its permit only
    /// while searching and extracting, and releases it before recursing.
    Shared,
}

/// Tuning for the research orchestrator and its helpers.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Branches in flight per limiter. Default: 2.
    pub concurrency: usize,
    /// Limiter scope. Default: [`ConcurrencyMode::PerLevel`].
    pub concurrency_mode: ConcurrencyMode,
    /// Deadline for one extraction call. Default: 60 s.
    pub extract_timeout: Duration,
    /// Learnings requested per search result. Default: 3.
    pub learnings_per_query: usize,
    /// Token budget for each individual search snippet. Default: 25 000.
    pub snippet_tokens: usize,
    /// Token budget for whole prompts. Default: 128 000.
    pub context_tokens: usize,
    /// Depth clamp applied to caller input. Default: [`MAX_DEPTH`].
    pub max_depth: usize,
    /// Breadth clamp applied to caller input. Default: [`MAX_BREADTH`].
    pub max_breadth: usize,
    /// Sampling temperature for structured generations. Default: 0.7.
    pub temperature: f32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            concurrency_mode: ConcurrencyMode::PerLevel,
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
            learnings_per_query: 3,
            snippet_tokens: 25_000,
            context_tokens: DEFAULT_CONTEXT_TOKENS,
            max_depth: MAX_DEPTH,
            max_breadth: MAX_BREADTH,
            temperature: 0.7,
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

/// Complete configuration for a research process.
#[derive(Debug, Clone)]
pub struct DelveConfig {
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub retry: RetryConfig,
}

impl DelveConfig {
    /// Defaults for everything except the model credential.
    pub fn new(model: ModelConfig) -> Self {
        Self {
            model,
            search: SearchConfig::default(),
            research: ResearchConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Load configuration from process environment variables.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `OPENROUTER_KEY` | model API key (required) |
    /// | `DELVE_API_URL` | chat-completions endpoint |
    /// | `DELVE_MODEL` | model identifier |
    /// | `FIRECRAWL_KEY` | search API key |
    /// | `FIRECRAWL_BASE_URL` | search base URL |
    /// | `CONTEXT_SIZE` | prompt token budget |
    /// | `DELVE_CONCURRENCY` | branches per limiter |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENROUTER_KEY").ok_or(ConfigError::MissingCredential("OPENROUTER_KEY"))?;
        let mut config = Self::new(ModelConfig::new(api_key));

        if let Some(url) = get("DELVE_API_URL") {
            config.model.api_url = url;
        }
        if let Some(model) = get("DELVE_MODEL") {
            config.model.model = model;
        }
        config.search.api_key = get("FIRECRAWL_KEY");
        if let Some(url) = get("FIRECRAWL_BASE_URL") {
            config.search.base_url = url;
        }
        if let Some(raw) = get("CONTEXT_SIZE") {
            config.research.context_tokens = parse_positive("CONTEXT_SIZE", &raw)?;
        }
        if let Some(raw) = get("DELVE_CONCURRENCY") {
            config.research.concurrency = parse_positive("DELVE_CONCURRENCY", &raw)?;
        }

        Ok(config)
    }

    // ── Builder methods ───────────────────────────────────────────

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model.model = model.into();
        self
    }

    /// Set the number of branches in flight per limiter (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.research.concurrency = concurrency.max(1);
        self
    }

    /// Set the limiter scope.
    pub fn with_concurrency_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.research.concurrency_mode = mode;
        self
    }

    /// Set the retry schedule for remote calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-extraction deadline.
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.research.extract_timeout = timeout;
        self
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = DelveConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("OPENROUTER_KEY"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = DelveConfig::from_lookup(lookup(&[("OPENROUTER_KEY", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential("OPENROUTER_KEY"));
    }

    #[test]
    fn defaults_apply_with_only_a_key() {
        let config = DelveConfig::from_lookup(lookup(&[("OPENROUTER_KEY", "sk-1")])).unwrap();
        assert_eq!(config.model.api_key, "sk-1");
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert_eq!(config.search.base_url, DEFAULT_SEARCH_URL);
        assert!(config.search.api_key.is_none());
        assert_eq!(config.research.concurrency, 2);
        assert_eq!(config.research.concurrency_mode, ConcurrencyMode::PerLevel);
        assert_eq!(config.research.extract_timeout, Duration::from_secs(60));
        assert_eq!(config.research.context_tokens, 128_000);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn environment_overrides() {
        let config = DelveConfig::from_lookup(lookup(&[
            ("OPENROUTER_KEY", "sk-1"),
            ("DELVE_MODEL", "openai/gpt-4o-mini"),
            ("DELVE_API_URL", "http://localhost:8080/v1/chat/completions"),
            ("FIRECRAWL_KEY", "fc-1"),
            ("FIRECRAWL_BASE_URL", "http://localhost:3002"),
            ("CONTEXT_SIZE", "32000"),
            ("DELVE_CONCURRENCY", "4"),
        ]))
        .unwrap();
        assert_eq!(config.model.model, "openai/gpt-4o-mini");
        assert_eq!(config.model.api_url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.search.api_key.as_deref(), Some("fc-1"));
        assert_eq!(config.search.base_url, "http://localhost:3002");
        assert_eq!(config.research.context_tokens, 32_000);
        assert_eq!(config.research.concurrency, 4);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = DelveConfig::from_lookup(lookup(&[
            ("OPENROUTER_KEY", "sk-1"),
            ("CONTEXT_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "CONTEXT_SIZE", .. }));

        let err = DelveConfig::from_lookup(lookup(&[
            ("OPENROUTER_KEY", "sk-1"),
            ("DELVE_CONCURRENCY", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DELVE_CONCURRENCY", .. }));
    }

    #[test]
    fn builders_override_fields() {
        let config = DelveConfig::new(ModelConfig::new("k"))
            .with_model("m")
            .with_concurrency(0)
            .with_concurrency_mode(ConcurrencyMode::Shared)
            .with_retry(RetryConfig::none())
            .with_extract_timeout(Duration::from_secs(5));
        assert_eq!(config.model.model, "m");
        assert_eq!(config.research.concurrency, 1);
        assert_eq!(config.research.concurrency_mode, ConcurrencyMode::Shared);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.research.extract_timeout, Duration::from_secs(5));
    }
}
