//! Shared fixtures for research integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use delve_rs::mock::{ScriptedModel, StaticSearch};
use delve_rs::prelude::*;

pub fn config() -> DelveConfig {
    DelveConfig::new(ModelConfig::new("test-key")).with_retry(RetryConfig::none())
}

pub fn researcher(model: &Arc<ScriptedModel>, search: &Arc<StaticSearch>, config: &DelveConfig) -> Researcher {
    Researcher::new(model.clone(), search.clone(), config)
}

pub fn link(url: &str, snippet: &str) -> SearchLink {
    SearchLink::new(format!("Page at {url}"), url, snippet)
}

/// A planner reply listing `queries`, each with goal "goal <query>".
pub fn plan(queries: &[&str]) -> String {
    let items: Vec<serde_json::Value> = queries
        .iter()
        .map(|q| serde_json::json!({"query": q, "researchGoal": format!("goal {q}")}))
        .collect();
    serde_json::json!({ "queries": items }).to_string()
}

/// An extraction reply.
pub fn learned(learnings: &[&str], follow_ups: &[&str]) -> String {
    serde_json::json!({"learnings": learnings, "followUpQuestions": follow_ups}).to_string()
}

/// Marker matching the extraction prompt for exactly `query`.
pub fn extraction_of(query: &str) -> String {
    format!("<query>{query}</query>")
}

pub fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}
