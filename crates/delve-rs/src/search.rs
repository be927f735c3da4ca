//! The web-search capability and its Firecrawl client.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::{CallError, ConfigError};

/// Return type of [`SearchProvider::search`].
pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = Result<SearchResult, CallError>> + Send + 'a>>;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchLink {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Results of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub links: Vec<SearchLink>,
}

impl SearchResult {
    /// Non-empty URLs, in result order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .map(|l| l.url.as_str())
            .filter(|u| !u.is_empty())
    }
}

/// A web-search backend. One attempt per call; must be safe to call from
/// many research branches at once.
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str) -> SearchFuture<'_>;
}

/// Stand-in results used when search fails outright. Both links are
/// labelled as placeholders so a reader of the final report can tell.
pub fn placeholder_results(query: &str) -> SearchResult {
    let wiki_slug = query.split_whitespace().collect::<Vec<_>>().join("_");
    let search_url = reqwest::Url::parse_with_params("https://www.google.com/search", &[("q", query)])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| "https://www.google.com/search".to_string());

    SearchResult {
        links: vec![
            SearchLink::new(
                format!("Wikipedia - {query}"),
                format!("https://en.wikipedia.org/wiki/{wiki_slug}"),
                "This is a placeholder result. Configure a working search provider to get real search results.",
            ),
            SearchLink::new(
                format!("Google Search - {query}"),
                search_url,
                "Placeholder result. For actual results, search manually or configure a valid search API key.",
            ),
        ],
    }
}

// ── Firecrawl ──────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct FirecrawlRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize, Debug)]
struct FirecrawlResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Vec<FirecrawlDocument>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FirecrawlDocument {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

/// Interpret a Firecrawl `/v1/search` response body.
pub fn parse_firecrawl(status: u16, text: &str) -> Result<SearchResult, CallError> {
    if !(200..300).contains(&status) {
        return Err(CallError::from_status(status, text));
    }
    let parsed: FirecrawlResponse = serde_json::from_str(text)
        .map_err(|e| CallError::Transient(format!("failed to parse search response: {e}")))?;

    if parsed.success == Some(false) {
        let msg = parsed.error.unwrap_or_else(|| "search unsuccessful".into());
        return Err(CallError::Transient(msg));
    }

    let links = parsed
        .data
        .into_iter()
        .filter_map(|doc| {
            let url = doc.url?;
            let snippet = doc
                .markdown
                .filter(|m| !m.trim().is_empty())
                .or(doc.description)
                .unwrap_or_default();
            Some(SearchLink {
                title: doc.title.unwrap_or_else(|| url.clone()),
                url,
                snippet,
            })
        })
        .collect();
    Ok(SearchResult { links })
}

/// Client for the Firecrawl search API (hosted or self-hosted).
#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    limit: usize,
}

impl FirecrawlClient {
    pub fn new(config: &SearchConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("delve-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        if config.api_key.is_none() {
            warn!("No search API key configured; only self-hosted search endpoints will work");
        }
        Ok(Self {
            client,
            endpoint: format!("{}/v1/search", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            limit: config.limit.max(1),
        })
    }

    async fn search_once(&self, query: &str) -> Result<SearchResult, CallError> {
        let start = Instant::now();
        let mut req = self.client.post(&self.endpoint).json(&FirecrawlRequest {
            query,
            limit: self.limit,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "Search response for {query:?}: HTTP {status} in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );
        parse_firecrawl(status.as_u16(), &text)
    }
}

impl SearchProvider for FirecrawlClient {
    fn search(&self, query: &str) -> SearchFuture<'_> {
        let query = query.to_string();
        Box::pin(async move { self.search_once(&query).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_labelled_and_built_from_query() {
        let result = placeholder_results("impact of caffeine");
        assert_eq!(result.links.len(), 2);
        assert_eq!(result.links[0].url, "https://en.wikipedia.org/wiki/impact_of_caffeine");
        assert!(result.links[1].url.starts_with("https://www.google.com/search?q=impact"));
        assert!(result.links.iter().all(|l| l.snippet.contains("laceholder")));
    }

    #[test]
    fn firecrawl_documents_map_to_links() {
        let body = r##"{"success":true,"data":[
            {"url":"https://a.example","title":"A","description":"about a"},
            {"url":"https://b.example","markdown":"# B body","description":"about b"},
            {"title":"no url"}
        ]}"##;
        let result = parse_firecrawl(200, body).unwrap();
        assert_eq!(
            result.links,
            vec![
                SearchLink::new("A", "https://a.example", "about a"),
                SearchLink::new("https://b.example", "https://b.example", "# B body"),
            ]
        );
    }

    #[test]
    fn firecrawl_failures_are_classified() {
        assert!(parse_firecrawl(429, "").unwrap_err().is_rate_limit());
        assert!(matches!(parse_firecrawl(402, "payment required"), Err(CallError::Fatal(_))));
        assert!(matches!(
            parse_firecrawl(200, r#"{"success":false,"error":"busy"}"#),
            Err(CallError::Transient(_))
        ));
    }

    #[test]
    fn urls_skip_empty_entries() {
        let result = SearchResult {
            links: vec![
                SearchLink::new("a", "https://a", ""),
                SearchLink::new("b", "", "text"),
            ],
        };
        assert_eq!(result.urls().collect::<Vec<_>>(), vec!["https://a"]);
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let config = SearchConfig {
            base_url: "http://localhost:3002/".into(),
            ..Default::default()
        };
        let client = FirecrawlClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:3002/v1/search");
    }
}
