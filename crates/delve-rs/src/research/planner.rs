//! Query planning: research query in, bounded list of sub-queries out.
//!
//! Also plans the clarifying questions asked before a run starts. Neither
//! operation ever fails; both fall back to fixed defaults.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::prompt::system_prompt;
use super::string_list_field;
use crate::config::ResearchConfig;
use crate::context::PromptBudget;
use crate::structured::{SchemaDescriptor, StructuredOutput};

/// Research goal attached to the fallback query.
pub const FALLBACK_GOAL: &str = "Explore the main concepts and information about this topic";

/// Clarifying questions used when the model gives none.
pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "Could you provide more details about your specific interests in this topic?",
    "What aspects of this topic are most important to you?",
    "Are there any specific questions you want answered about this topic?",
];

/// Field names recognized as the question list, in priority order.
const QUESTION_ALIASES: &[&str] = &["questions", "follow_up_questions", "followUpQuestions"];

/// One sub-query and the goal it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchQuery {
    /// The search engine query
    #[serde(rename = "query")]
    pub text: String,
    /// First the goal of the research this query is meant to accomplish, then
    /// how to advance the research once results are found, including
    /// specific additional research directions.
    #[serde(rename = "researchGoal", default)]
    pub research_goal: String,
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            research_goal: research_goal.into(),
        }
    }
}

/// List of search engine queries.
#[derive(Debug, Deserialize, JsonSchema)]
struct QueryPlan {
    queries: Vec<ResearchQuery>,
}

/// Turns research queries into sub-queries and clarifying questions.
#[derive(Clone)]
pub struct QueryPlanner {
    structured: StructuredOutput,
    budget: PromptBudget,
    context_tokens: usize,
    temperature: f32,
}

impl QueryPlanner {
    pub fn new(structured: StructuredOutput, config: &ResearchConfig) -> Self {
        Self {
            structured,
            budget: PromptBudget::default(),
            context_tokens: config.context_tokens,
            temperature: config.temperature,
        }
    }

    /// At most `n` sub-queries for `query`, steered by `prior` learnings.
    ///
    /// An unusable model response yields the original query with a generic
    /// goal. A well-formed but empty plan is returned as-is.
    pub async fn plan(&self, query: &str, prior: &[String], n: usize) -> Vec<ResearchQuery> {
        if n == 0 {
            return Vec::new();
        }

        let mut prompt = format!(
            "Given the following prompt from the user, generate a list of search engine queries to \
             research the topic. Return a maximum of {n} queries, but feel free to return less if the \
             original prompt is clear. Make sure each query is unique and not similar to each other: \
             <prompt>{query}</prompt>"
        );
        if !prior.is_empty() {
            prompt.push_str(&format!(
                "\n\nHere are some learnings from previous research, use them to generate more specific queries: {}",
                prior.join("\n")
            ));
        }
        let prompt = self.budget.fit(&prompt, self.context_tokens);

        let schema = SchemaDescriptor::for_type::<QueryPlan>();
        let out = self
            .structured
            .obtain(prompt, &system_prompt(), Some(&schema), Some(self.temperature))
            .await;

        let Some(plan) = out.decode::<QueryPlan>() else {
            warn!("Query planning failed; researching the original query directly");
            return vec![ResearchQuery::new(query, FALLBACK_GOAL)];
        };

        let queries: Vec<ResearchQuery> = plan
            .queries
            .into_iter()
            .filter(|q| !q.text.trim().is_empty())
            .take(n)
            .collect();
        info!("Created {} queries", queries.len());
        queries
    }

    /// At most `n` clarifying questions about `query`.
    pub async fn follow_up_questions(&self, query: &str, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }

        let prompt = format!(
            "Given the following query from the user, ask some follow up questions to clarify the \
             research direction. Return a maximum of {n} questions, but feel free to return less if \
             the original query is clear: <query>{query}</query>"
        );
        let prompt = self.budget.fit(&prompt, self.context_tokens);
        let schema = SchemaDescriptor::from_value(json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!("Follow up questions to clarify the research direction, max of {n}")
                }
            },
            "required": ["questions"]
        }));

        let out = self
            .structured
            .obtain(prompt, &system_prompt(), Some(&schema), Some(0.5))
            .await;

        let questions = if out.stage.is_fallback() {
            Vec::new()
        } else {
            string_list_field(&out.value, QUESTION_ALIASES)
        };

        if questions.is_empty() {
            warn!("No usable follow-up questions; using defaults");
            return DEFAULT_QUESTIONS
                .iter()
                .take(n)
                .map(|q| (*q).to_string())
                .collect();
        }
        questions.into_iter().take(n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::{Resilient, RetryConfig};
    use crate::mock::ScriptedModel;
    use std::sync::Arc;

    fn planner(model: &Arc<ScriptedModel>) -> QueryPlanner {
        let structured = StructuredOutput::new(model.clone(), Resilient::new(RetryConfig::none()));
        QueryPlanner::new(structured, &ResearchConfig::default())
    }

    #[tokio::test]
    async fn plan_is_truncated_to_n() {
        let model = Arc::new(ScriptedModel::new().reply(
            r#"{"queries":[
                {"query":"caffeine half-life","researchGoal":"g1"},
                {"query":"adenosine receptors","researchGoal":"g2"},
                {"query":"sleep latency studies","researchGoal":"g3"}
            ]}"#,
        ));
        let queries = planner(&model).plan("caffeine and sleep", &[], 2).await;
        assert_eq!(
            queries,
            vec![
                ResearchQuery::new("caffeine half-life", "g1"),
                ResearchQuery::new("adenosine receptors", "g2"),
            ]
        );
    }

    #[tokio::test]
    async fn prior_learnings_are_included() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"queries":[]}"#));
        let prior = vec!["Caffeine half-life is about 5 hours".to_string()];
        let queries = planner(&model).plan("q", &prior, 3).await;
        assert!(queries.is_empty());
        assert!(model.calls()[0].prompt.contains("about 5 hours"));
    }

    #[tokio::test]
    async fn unusable_plan_falls_back_to_original_query() {
        let model = Arc::new(ScriptedModel::new().reply("Sorry, I can't do that."));
        let queries = planner(&model).plan("why is the sky blue", &[], 3).await;
        assert_eq!(queries, vec![ResearchQuery::new("why is the sky blue", FALLBACK_GOAL)]);
    }

    #[tokio::test]
    async fn zero_queries_requested_skips_the_model() {
        let model = Arc::new(ScriptedModel::new());
        assert!(planner(&model).plan("q", &[], 0).await.is_empty());
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn follow_up_aliases_are_checked_in_order() {
        let model = Arc::new(ScriptedModel::new().reply(
            r#"{"followUpQuestions":["late"],"follow_up_questions":["Which population?","Over what period?"]}"#,
        ));
        let questions = planner(&model).follow_up_questions("q", 5).await;
        assert_eq!(questions, vec!["Which population?", "Over what period?"]);
    }

    #[tokio::test]
    async fn follow_ups_fall_back_to_defaults() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"unrelated": ["x"]}"#));
        let questions = planner(&model).follow_up_questions("q", 2).await;
        assert_eq!(questions, DEFAULT_QUESTIONS[..2].to_vec());
    }
}
