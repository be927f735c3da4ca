//! The research engine: planning, extraction, recursion and synthesis.

pub mod extractor;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod prompt;
pub mod synthesis;

use serde_json::Value;

pub use extractor::{LearningExtraction, ResultExtractor};
pub use orchestrator::{ResearchResult, Researcher};
pub use planner::{QueryPlanner, ResearchQuery};
pub use progress::{
    FnObserver, LatestProgress, LoggingObserver, NoopObserver, ProgressObserver, ResearchProgress,
};
pub use synthesis::Synthesizer;

/// The string items of the first alias field that holds an array.
///
/// Aliases are checked in order and the first array found wins, even if it
/// holds no strings. Non-string items are skipped.
pub(crate) fn string_list_field(value: &Value, aliases: &[&str]) -> Vec<String> {
    aliases
        .iter()
        .find_map(|name| value.get(*name).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_matching_alias_wins() {
        let value = json!({"b": ["from b"], "a": ["from a"]});
        assert_eq!(string_list_field(&value, &["a", "b"]), vec!["from a"]);
    }

    #[test]
    fn matched_alias_stops_the_search() {
        let value = json!({"a": [1, 2], "b": ["text"]});
        assert!(string_list_field(&value, &["a", "b"]).is_empty());
    }

    #[test]
    fn non_arrays_are_skipped() {
        let value = json!({"a": "scalar", "b": ["x", 3, " ", "y"]});
        assert_eq!(string_list_field(&value, &["a", "b"]), vec!["x", "y"]);
    }

    #[test]
    fn missing_fields_yield_nothing() {
        assert!(string_list_field(&json!([]), &["a"]).is_empty());
    }
}
