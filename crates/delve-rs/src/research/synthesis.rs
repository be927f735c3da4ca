//! Final report and answer writers.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use super::prompt::{system_prompt, tagged};
use crate::config::ResearchConfig;
use crate::context::PromptBudget;
use crate::structured::{SchemaDescriptor, StructuredOutput};

#[derive(Debug, Deserialize, JsonSchema)]
struct Report {
    /// Final report on the topic in Markdown
    #[serde(rename = "reportMarkdown")]
    report_markdown: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Answer {
    /// The final answer, short and concise, just the answer, no other text
    #[serde(rename = "exactAnswer")]
    exact_answer: String,
}

/// Writes the final report or answer from accumulated learnings.
#[derive(Clone)]
pub struct Synthesizer {
    structured: StructuredOutput,
    budget: PromptBudget,
    context_tokens: usize,
    temperature: f32,
}

impl Synthesizer {
    pub fn new(structured: StructuredOutput, config: &ResearchConfig) -> Self {
        Self {
            structured,
            budget: PromptBudget::default(),
            context_tokens: config.context_tokens,
            temperature: config.temperature,
        }
    }

    /// A long-form Markdown report ending in a `## Sources` section.
    pub async fn write_report(&self, query: &str, learnings: &[String], urls: &[String]) -> String {
        let prompt = format!(
            "Given the following prompt from the user, write a final report on the topic using the \
             learnings from research. Make it as detailed as possible, aim for 3 or more pages, include \
             ALL the learnings from research:\n\n<prompt>{query}</prompt>\n\nHere are all the learnings \
             from previous research:\n\n<learnings>\n{}\n</learnings>",
            tagged("learning", learnings)
        );
        let prompt = self.budget.fit(&prompt, self.context_tokens);
        let schema = SchemaDescriptor::for_type::<Report>();

        let out = self
            .structured
            .obtain(prompt, &system_prompt(), Some(&schema), Some(self.temperature))
            .await;

        match out.decode::<Report>() {
            Some(r) if !r.report_markdown.trim().is_empty() => {
                format!("{}{}", r.report_markdown, sources_section(urls))
            }
            _ => {
                warn!("Report generation failed; writing fallback report");
                fallback_report(query, learnings, urls)
            }
        }
    }

    /// A short answer in whatever format the query asks for.
    pub async fn write_answer(&self, query: &str, learnings: &[String]) -> String {
        let prompt = format!(
            "Given the following prompt from the user, write a final answer on the topic using the \
             learnings from research. Follow the format specified in the prompt. Do not include any \
             text other than the answer in that format. Keep the answer as concise as possible: usually \
             just a few words or at most a sentence. If the prompt uses LaTeX, answer in LaTeX; if it \
             gives multiple answer choices, the answer should be one of the choices.\n\n\
             <prompt>{query}</prompt>\n\nHere are all the learnings from research on the topic that you \
             can use to help answer the prompt:\n\n<learnings>\n{}\n</learnings>",
            tagged("learning", learnings)
        );
        let prompt = self.budget.fit(&prompt, self.context_tokens);
        let schema = SchemaDescriptor::for_type::<Answer>();

        let out = self
            .structured
            .obtain(prompt, &system_prompt(), Some(&schema), Some(self.temperature))
            .await;

        match out.decode::<Answer>() {
            Some(a) if !a.exact_answer.trim().is_empty() => a.exact_answer,
            _ => {
                warn!("Answer generation failed; summarizing learnings instead");
                fallback_answer(learnings)
            }
        }
    }
}

fn sources_section(urls: &[String]) -> String {
    let list = urls
        .iter()
        .map(|u| format!("- {u}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Sources\n\n{list}")
}

fn fallback_report(query: &str, learnings: &[String], urls: &[String]) -> String {
    let list = learnings
        .iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# Research Report on: {query}\n\n## Error\n\nUnable to generate a complete report. \
         Here are the key learnings:\n\n{list}{}",
        sources_section(urls)
    )
}

fn fallback_answer(learnings: &[String]) -> String {
    let summary = learnings
        .iter()
        .take(3)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Based on the research, I couldn't generate a precise answer in the requested format, \
         but here's a summary of the key findings: {summary}"
    )
}
