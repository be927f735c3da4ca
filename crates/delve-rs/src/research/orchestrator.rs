//! The recursive research engine.
//!
//! A run expands a query into at most `breadth` sub-queries, runs them as
//! branches under a semaphore, and lets each branch recurse on its own
//! follow-up questions with half the breadth and one less depth. Branch
//! results are merged and deduplicated on the way back up.
//!
//! Branches never fail. Search failures are replaced by placeholder results,
//! extraction failures contribute nothing, and a panicking branch is caught
//! at its boundary and contributes nothing, leaving its siblings untouched.
//!
//! # Concurrency
//!
//! With [`ConcurrencyMode::PerLevel`] (the default) every recursion level
//! creates its own semaphore and a branch keeps its permit while its subtree
//! runs. Nested levels are admitted independently, so the number of calls
//! in flight across the whole tree can exceed the nominal limit.
//! [`ConcurrencyMode::Shared`] uses one semaphore for the tree; a branch then
//! holds a permit only for its own search and extraction and gives it back
//! before recursing, otherwise a deep tree would starve itself.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::extractor::ResultExtractor;
use super::planner::{QueryPlanner, ResearchQuery};
use super::progress::{NoopObserver, ProgressObserver, ProgressTracker};
use super::synthesis::Synthesizer;
use crate::api::retry::Resilient;
use crate::config::{ConcurrencyMode, DelveConfig, ResearchConfig};
use crate::error::ResearchError;
use crate::model::LanguageModel;
use crate::search::{SearchProvider, SearchResult, placeholder_results};
use crate::structured::StructuredOutput;

/// Accumulated output of a research run. Entries are unique; order is
/// first-seen but callers should not rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchResult {
    /// Union of several results with exact-match deduplication.
    pub fn merge(results: impl IntoIterator<Item = ResearchResult>) -> Self {
        let (learnings, urls): (Vec<_>, Vec<_>) = results
            .into_iter()
            .map(|r| (r.learnings, r.visited_urls))
            .unzip();
        Self {
            learnings: dedup(learnings.into_iter().flatten()),
            visited_urls: dedup(urls.into_iter().flatten()),
        }
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

/// Query text for the next level down: the branch's goal plus the
/// follow-up directions its results suggested.
pub fn continuation_query(research_goal: &str, follow_ups: &[String]) -> String {
    let directions: String = follow_ups.iter().map(|q| format!("\n{q}")).collect();
    format!("Previous research goal: {research_goal}\nFollow-up research directions: {directions}")
        .trim()
        .to_string()
}

/// One recursive call's inputs.
struct Node {
    query: String,
    breadth: usize,
    depth: usize,
    learnings: Vec<String>,
    urls: Vec<String>,
}

/// State shared by every level of one run.
struct Run {
    tracker: ProgressTracker,
    shared_limiter: Option<Arc<Semaphore>>,
}

/// Runs research trees and writes their reports.
///
/// Cheap to clone; all remote capabilities are behind `Arc`s.
#[derive(Clone)]
pub struct Researcher {
    planner: QueryPlanner,
    extractor: ResultExtractor,
    synthesizer: Synthesizer,
    search: Arc<dyn SearchProvider>,
    resilient: Resilient,
    config: ResearchConfig,
    observer: Arc<dyn ProgressObserver>,
}

impl Researcher {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: &DelveConfig,
    ) -> Self {
        let resilient = Resilient::new(config.retry.clone());
        let structured = StructuredOutput::new(model, resilient.clone());
        Self {
            planner: QueryPlanner::new(structured.clone(), &config.research),
            extractor: ResultExtractor::new(structured.clone(), &config.research),
            synthesizer: Synthesizer::new(structured, &config.research),
            search,
            resilient,
            config: config.research.clone(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Receive progress snapshots from every run.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Research `query` to the given breadth and depth.
    ///
    /// Fails only for an empty query. A run in which every remote call
    /// fails still returns (possibly empty) results.
    pub async fn research(
        &self,
        query: &str,
        breadth: usize,
        depth: usize,
    ) -> Result<ResearchResult, ResearchError> {
        self.research_from(query, breadth, depth, Vec::new(), Vec::new())
            .await
    }

    /// Like [`research`](Self::research), continuing from earlier learnings
    /// and URLs.
    pub async fn research_from(
        &self,
        query: &str,
        breadth: usize,
        depth: usize,
        prior_learnings: Vec<String>,
        prior_urls: Vec<String>,
    ) -> Result<ResearchResult, ResearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::EmptyQuery);
        }

        let breadth = clamp("breadth", breadth, self.config.max_breadth);
        let depth = clamp("depth", depth, self.config.max_depth);
        if breadth == 0 {
            return Ok(ResearchResult::default());
        }

        let run = Run {
            tracker: ProgressTracker::new(depth, breadth, Arc::clone(&self.observer)),
            shared_limiter: match self.config.concurrency_mode {
                ConcurrencyMode::Shared => Some(Arc::new(Semaphore::new(self.config.concurrency.max(1)))),
                ConcurrencyMode::PerLevel => None,
            },
        };
        let node = Node {
            query: query.to_string(),
            breadth,
            depth,
            learnings: prior_learnings,
            urls: prior_urls,
        };

        if depth == 0 {
            return Ok(self.leaf(&run, node).await);
        }

        let result = self.level(&run, node).await;
        let done = run.tracker.snapshot();
        info!(
            "Research complete: {} learnings, {} URLs, {}/{} queries",
            result.learnings.len(),
            result.visited_urls.len(),
            done.completed_queries,
            done.total_queries,
        );
        Ok(result)
    }

    /// Clarifying questions to ask before researching `query`.
    pub async fn plan_follow_ups(&self, query: &str, n: usize) -> Vec<String> {
        self.planner.follow_up_questions(query, n).await
    }

    /// Long-form Markdown report.
    pub async fn write_report(&self, query: &str, learnings: &[String], urls: &[String]) -> String {
        self.synthesizer.write_report(query, learnings, urls).await
    }

    /// Short answer.
    pub async fn write_answer(&self, query: &str, learnings: &[String]) -> String {
        self.synthesizer.write_answer(query, learnings).await
    }

    // ── Recursion ─────────────────────────────────────────────────

    /// Plan, fan out, merge. `node.depth` is at least 1 here.
    fn level<'a>(&'a self, run: &'a Run, node: Node) -> BoxFuture<'a, ResearchResult> {
        Box::pin(async move {
            let queries = self
                .planner
                .plan(&node.query, &node.learnings, node.breadth)
                .await;
            if queries.is_empty() {
                return ResearchResult::default();
            }

            run.tracker.update(|p| {
                p.total_queries += queries.len();
                p.current_query = queries.first().map(|q| q.text.clone());
            });

            let limiter = match &run.shared_limiter {
                Some(shared) => Arc::clone(shared),
                None => Arc::new(Semaphore::new(self.config.concurrency.max(1))),
            };

            let branches = queries.into_iter().map(|q| {
                let text = q.text.clone();
                let branch = self.branch(
                    run,
                    Arc::clone(&limiter),
                    q,
                    node.breadth,
                    node.depth,
                    node.learnings.clone(),
                    node.urls.clone(),
                );
                async move {
                    match AssertUnwindSafe(branch).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!("Branch for {text:?} panicked; it contributes nothing");
                            ResearchResult::default()
                        }
                    }
                }
            });

            ResearchResult::merge(join_all(branches).await)
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn branch(
        &self,
        run: &Run,
        limiter: Arc<Semaphore>,
        query: ResearchQuery,
        breadth: usize,
        depth: usize,
        learnings: Vec<String>,
        urls: Vec<String>,
    ) -> ResearchResult {
        let Ok(permit) = limiter.acquire_owned().await else {
            warn!("Concurrency limiter closed; skipping {:?}", query.text);
            return ResearchResult::default();
        };

        let result = self.search_or_placeholder(&query.text).await;
        let new_breadth = breadth.div_ceil(2);
        let new_depth = depth.saturating_sub(1);

        let extraction = self
            .extractor
            .extract(&query.text, &result, self.config.learnings_per_query, new_breadth)
            .await;

        let mut all_learnings = learnings;
        all_learnings.extend(extraction.learnings);
        let mut all_urls = urls;
        all_urls.extend(result.urls().map(str::to_string));

        if new_depth == 0 {
            run.tracker.update(|p| {
                p.current_depth = 0;
                p.completed_queries += 1;
                p.current_query = Some(query.text.clone());
            });
            return ResearchResult {
                learnings: all_learnings,
                visited_urls: all_urls,
            };
        }

        info!("Researching deeper, breadth: {new_breadth}, depth: {new_depth}");
        run.tracker.update(|p| {
            p.current_depth = new_depth;
            p.current_breadth = new_breadth;
            p.completed_queries += 1;
            p.current_query = Some(query.text.clone());
        });

        let mut permit = Some(permit);
        if run.shared_limiter.is_some() {
            permit.take();
        }

        let next = Node {
            query: continuation_query(&query.research_goal, &extraction.follow_up_questions),
            breadth: new_breadth,
            depth: new_depth,
            learnings: all_learnings,
            urls: all_urls,
        };
        let out = self.level(run, next).await;
        drop(permit);
        out
    }

    /// Depth-0 entry: research the query itself, without planning.
    async fn leaf(&self, run: &Run, node: Node) -> ResearchResult {
        run.tracker.update(|p| {
            p.total_queries = 1;
            p.current_query = Some(node.query.clone());
        });

        let result = self.search_or_placeholder(&node.query).await;
        let extraction = self
            .extractor
            .extract(&node.query, &result, self.config.learnings_per_query, 0)
            .await;

        run.tracker.update(|p| p.completed_queries += 1);

        let mut learnings = node.learnings;
        learnings.extend(extraction.learnings);
        let mut urls = node.urls;
        urls.extend(result.urls().map(str::to_string));
        ResearchResult::merge([ResearchResult {
            learnings,
            visited_urls: urls,
        }])
    }

    async fn search_or_placeholder(&self, query: &str) -> SearchResult {
        match self
            .resilient
            .call("search", || self.search.search(query))
            .await
        {
            Ok(result) => {
                debug!("Search {query:?}: {} links", result.links.len());
                result
            }
            Err(e) => {
                warn!("Search failed for {query:?}: {e}; using placeholder results");
                placeholder_results(query)
            }
        }
    }
}

fn clamp(name: &str, value: usize, cap: usize) -> usize {
    if value > cap {
        warn!("Requested {name} {value} exceeds the cap of {cap}; clamping");
        cap
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_dedups_across_branches() {
        let merged = ResearchResult::merge([
            ResearchResult {
                learnings: strings(&["a", "b"]),
                visited_urls: strings(&["u1", "u2"]),
            },
            ResearchResult {
                learnings: strings(&["b", "c"]),
                visited_urls: strings(&["u2", "u3"]),
            },
        ]);
        assert_eq!(merged.learnings, strings(&["a", "b", "c"]));
        assert_eq!(merged.visited_urls, strings(&["u1", "u2", "u3"]));
    }

    #[test]
    fn near_duplicates_are_kept() {
        let merged = ResearchResult::merge([ResearchResult {
            learnings: strings(&["Caffeine lasts 5h", "caffeine lasts 5h"]),
            visited_urls: vec![],
        }]);
        assert_eq!(merged.learnings.len(), 2);
    }

    #[test]
    fn continuation_embeds_goal_and_directions() {
        let q = continuation_query("Understand half-life", &strings(&["Does age matter?", "What about tea?"]));
        assert_eq!(
            q,
            "Previous research goal: Understand half-life\n\
             Follow-up research directions: \nDoes age matter?\nWhat about tea?"
        );
    }

    #[test]
    fn continuation_without_directions_is_trimmed() {
        let q = continuation_query("g", &[]);
        assert_eq!(q, "Previous research goal: g\nFollow-up research directions:");
    }

    #[test]
    fn serializes_visited_urls_camel_case() {
        let json = serde_json::to_value(ResearchResult::default()).unwrap();
        assert!(json.get("visitedUrls").is_some());
    }

    #[test]
    fn clamp_caps_values() {
        assert_eq!(clamp("depth", 3, 8), 3);
        assert_eq!(clamp("depth", 100, 8), 8);
    }
}
