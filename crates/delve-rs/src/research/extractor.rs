//! Learning extraction: one query's search results in, learnings and
//! follow-up questions out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::prompt::system_prompt;
use super::string_list_field;
use crate::config::ResearchConfig;
use crate::context::PromptBudget;
use crate::search::SearchResult;
use crate::structured::{SchemaDescriptor, StructuredOutput};

const LEARNING_ALIASES: &[&str] = &["learnings"];
const FOLLOW_UP_ALIASES: &[&str] = &["followUpQuestions", "follow_up_questions", "questions"];

/// What one query's results taught us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningExtraction {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

impl LearningExtraction {
    pub fn is_empty(&self) -> bool {
        self.learnings.is_empty() && self.follow_up_questions.is_empty()
    }
}

/// Extracts learnings from search results under a deadline.
#[derive(Clone)]
pub struct ResultExtractor {
    structured: StructuredOutput,
    budget: PromptBudget,
    snippet_tokens: usize,
    context_tokens: usize,
    timeout: Duration,
    temperature: f32,
}

impl ResultExtractor {
    pub fn new(structured: StructuredOutput, config: &ResearchConfig) -> Self {
        Self {
            structured,
            budget: PromptBudget::default(),
            snippet_tokens: config.snippet_tokens,
            context_tokens: config.context_tokens,
            timeout: config.extract_timeout,
            temperature: config.temperature,
        }
    }

    /// At most `max_learnings` learnings and `max_follow_ups` questions.
    ///
    /// Returns an empty extraction when the results carry no text, when the
    /// model output is unusable, or when the deadline passes.
    pub async fn extract(
        &self,
        query: &str,
        result: &SearchResult,
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> LearningExtraction {
        let contents: Vec<&str> = result
            .links
            .iter()
            .map(|l| l.snippet.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.budget.fit(s, self.snippet_tokens))
            .collect();
        info!("Ran {query:?}, found {} contents", contents.len());
        if contents.is_empty() {
            return LearningExtraction::default();
        }

        let contents = contents
            .iter()
            .map(|c| format!("<content>\n{c}\n</content>"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given the following contents from a search engine query <query>{query}</query>, generate a \
             list of learnings from the contents. Return a maximum of {max_learnings} learnings, but feel \
             free to return less if the contents are clear. Make sure each learning is unique and not \
             similar to each other. The learnings should be concise and to the point, as detailed and \
             information dense as possible. Include any entities like people, places, companies, \
             products and things, as well as any exact metrics, numbers, or dates. The learnings will \
             be used to research the topic further.\n\n<contents>{contents}</contents>"
        );
        let prompt = self.budget.fit(&prompt, self.context_tokens);

        let schema = SchemaDescriptor::from_value(json!({
            "type": "object",
            "properties": {
                "learnings": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!("List of learnings, max of {max_learnings}")
                },
                "followUpQuestions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!(
                        "List of follow-up questions to research the topic further, max of {max_follow_ups}"
                    )
                }
            },
            "required": ["learnings", "followUpQuestions"]
        }));

        let system = system_prompt();
        let call = self.structured.obtain(
            prompt,
            &system,
            Some(&schema),
            Some(self.temperature),
        );
        let out = match tokio::time::timeout(self.timeout, call).await {
            Ok(out) => out,
            Err(_) => {
                warn!("Timeout extracting learnings for {query:?} after {:?}", self.timeout);
                return LearningExtraction::default();
            }
        };
        if out.stage.is_fallback() {
            warn!("No usable extraction for {query:?}");
            return LearningExtraction::default();
        }

        let mut learnings = string_list_field(&out.value, LEARNING_ALIASES);
        learnings.truncate(max_learnings);
        let mut follow_up_questions = string_list_field(&out.value, FOLLOW_UP_ALIASES);
        follow_up_questions.truncate(max_follow_ups);

        info!("Created {} learnings", learnings.len());
        LearningExtraction {
            learnings,
            follow_up_questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::{Resilient, RetryConfig};
    use crate::mock::ScriptedModel;
    use crate::search::SearchLink;
    use std::sync::Arc;

    fn extractor(model: &Arc<ScriptedModel>, config: &ResearchConfig) -> ResultExtractor {
        let structured = StructuredOutput::new(model.clone(), Resilient::new(RetryConfig::none()));
        ResultExtractor::new(structured, config)
    }

    fn results(snippets: &[&str]) -> SearchResult {
        SearchResult {
            links: snippets
                .iter()
                .enumerate()
                .map(|(i, s)| SearchLink::new(format!("t{i}"), format!("https://e.example/{i}"), *s))
                .collect(),
        }
    }

    #[tokio::test]
    async fn fenced_output_is_decoded() {
        let model = Arc::new(
            ScriptedModel::new().reply("```json\n{\"learnings\": [\"a\"], \"followUpQuestions\": []}\n```"),
        );
        let out = extractor(&model, &ResearchConfig::default())
            .extract("q", &results(&["some text"]), 3, 3)
            .await;
        assert_eq!(
            out,
            LearningExtraction {
                learnings: vec!["a".into()],
                follow_up_questions: vec![],
            }
        );
    }

    #[tokio::test]
    async fn prose_yields_empty_extraction() {
        let model = Arc::new(ScriptedModel::new().reply("The contents discuss caffeine at length."));
        let out = extractor(&model, &ResearchConfig::default())
            .extract("q", &results(&["text"]), 3, 3)
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn limits_are_enforced() {
        let model = Arc::new(ScriptedModel::new().reply(
            r#"{"learnings":["1","2","3","4"],"followUpQuestions":["a","b","c"]}"#,
        ));
        let out = extractor(&model, &ResearchConfig::default())
            .extract("q", &results(&["text"]), 2, 1)
            .await;
        assert_eq!(out.learnings, vec!["1", "2"]);
        assert_eq!(out.follow_up_questions, vec!["a"]);
    }

    #[tokio::test]
    async fn prompt_holds_only_non_empty_snippets() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"learnings":[],"followUpQuestions":[]}"#));
        extractor(&model, &ResearchConfig::default())
            .extract("caffeine", &results(&["first snippet", "  ", "second snippet"]), 3, 3)
            .await;
        let prompt = &model.calls()[0].prompt;
        assert_eq!(prompt.matches("<content>").count(), 2);
        assert!(prompt.contains("<query>caffeine</query>"));
    }

    #[tokio::test]
    async fn no_text_skips_the_model() {
        let model = Arc::new(ScriptedModel::new());
        let out = extractor(&model, &ResearchConfig::default())
            .extract("q", &results(&["", " "]), 3, 3)
            .await;
        assert!(out.is_empty());
        assert!(model.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let model = Arc::new(
            ScriptedModel::new()
                .with_latency(Duration::from_secs(120))
                .reply(r#"{"learnings":["late"],"followUpQuestions":[]}"#),
        );
        let start = tokio::time::Instant::now();
        let out = extractor(&model, &ResearchConfig::default())
            .extract("q", &results(&["text"]), 3, 3)
            .await;
        assert!(out.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }
}
