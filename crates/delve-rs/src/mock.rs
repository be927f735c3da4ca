//! Scripted stand-ins for the remote capabilities.
//!
//! [`ScriptedModel`] and [`StaticSearch`] let research runs execute
//! offline and deterministically:
//!
//! - **Routed replies**: answer any prompt containing a marker string, no
//!   matter which branch asks first.
//! - **Queued replies**: answer calls in order when ordering is known.
//! - **Failures and latency**: exercise retries, placeholders and timeouts.
//! - **Call recording**: assert on what was asked and how often.
//!
//! # Example
//!
//! ```
//! use delve_rs::mock::{ScriptedModel, StaticSearch};
//! use delve_rs::search::SearchLink;
//!
//! let model = ScriptedModel::new()
//!     .when("search engine queries", r#"{"queries":[{"query":"q1","researchGoal":"g"}]}"#)
//!     .otherwise(r#"{"learnings":["fact"],"followUpQuestions":[]}"#);
//! let search = StaticSearch::new()
//!     .with_links("q1", vec![SearchLink::new("t", "https://a.example", "body")]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::CallError;
use crate::model::{GenerateRequest, LanguageModel, ModelFuture};
use crate::search::{SearchFuture, SearchLink, SearchProvider, SearchResult};

type Reply = Result<String, CallError>;

/// A [`LanguageModel`] that answers from a script.
///
/// Each call is resolved in this order: the first routed reply whose marker
/// occurs in the prompt, then the next queued reply, then the default.
/// With none of those, the call fails fatally.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    routes: Vec<(String, Reply)>,
    queue: Mutex<VecDeque<Reply>>,
    default: Option<Reply>,
    latency: Option<Duration>,
    calls: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.enqueue(Ok(text.into()))
    }

    /// Queue a failure.
    pub fn fail(self, error: CallError) -> Self {
        self.enqueue(Err(error))
    }

    /// Answer every prompt containing `marker` with `text`.
    pub fn when(mut self, marker: impl Into<String>, text: impl Into<String>) -> Self {
        self.routes.push((marker.into(), Ok(text.into())));
        self
    }

    /// Fail every prompt containing `marker`.
    pub fn when_fail(mut self, marker: impl Into<String>, error: CallError) -> Self {
        self.routes.push((marker.into(), Err(error)));
        self
    }

    /// Answer anything else with `text`.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.default = Some(Ok(text.into()));
        self
    }

    /// Delay every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of received prompts containing `marker`.
    pub fn calls_containing(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.prompt.contains(marker))
            .count()
    }

    fn enqueue(self, reply: Reply) -> Self {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(reply);
        }
        self
    }

    fn resolve(&self, request: &GenerateRequest) -> Reply {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        if let Some((_, reply)) = self
            .routes
            .iter()
            .find(|(marker, _)| request.prompt.contains(marker.as_str()))
        {
            return reply.clone();
        }
        if let Some(reply) = self.queue.lock().ok().and_then(|mut q| q.pop_front()) {
            return reply;
        }
        self.default
            .clone()
            .unwrap_or_else(|| Err(CallError::Fatal("no scripted reply".into())))
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, request: &GenerateRequest) -> ModelFuture<'_> {
        let reply = self.resolve(request);
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            reply
        })
    }
}

/// A [`SearchProvider`] with fixed per-query results.
///
/// Unknown queries get the default result, or fail transiently when there
/// is none. Tracks how many searches are in flight at once.
#[derive(Debug, Default)]
pub struct StaticSearch {
    results: HashMap<String, Result<SearchResult, CallError>>,
    default: Option<SearchResult>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `links` for exactly `query`.
    pub fn with_links(mut self, query: impl Into<String>, links: Vec<SearchLink>) -> Self {
        self.results.insert(query.into(), Ok(SearchResult { links }));
        self
    }

    /// Fail every search for exactly `query`.
    pub fn with_failure(mut self, query: impl Into<String>, error: CallError) -> Self {
        self.results.insert(query.into(), Err(error));
        self
    }

    /// Return `links` for any other query.
    pub fn with_default(mut self, links: Vec<SearchLink>) -> Self {
        self.default = Some(SearchResult { links });
        self
    }

    /// Delay every search.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every query received so far, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Most searches observed in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn resolve(&self, query: &str) -> Result<SearchResult, CallError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        match self.results.get(query) {
            Some(result) => result.clone(),
            None => self
                .default
                .clone()
                .ok_or_else(|| CallError::Transient(format!("no results scripted for {query:?}"))),
        }
    }
}

impl SearchProvider for StaticSearch {
    fn search(&self, query: &str) -> SearchFuture<'_> {
        let result = self.resolve(query);
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}
