//! Prompt text shared by the research stages.

use chrono::{DateTime, Utc};

/// The system prompt used by every research generation.
pub fn system_prompt() -> String {
    system_prompt_at(Utc::now())
}

/// [`system_prompt`] pinned to a given instant.
pub fn system_prompt_at(now: DateTime<Utc>) -> String {
    format!(
        "You are an expert researcher. Today is {}. Follow these instructions when responding:
- You may be asked about subjects after your knowledge cutoff. Assume the user is right when presented with news.
- The user is a highly experienced analyst. Do not simplify; be as detailed as possible and make sure your response is correct.
- Be highly organized.
- Suggest solutions the user did not think about, and anticipate their needs.
- Mistakes erode trust, so be accurate and thorough.
- Value good arguments over authorities; the source is irrelevant.
- Consider new technologies and contrarian ideas, not just the conventional wisdom.
- You may speculate or predict, but flag it clearly.",
        now.format("%Y-%m-%d")
    )
}

/// Fold clarifying questions and their answers into the research query.
///
/// With no answers the initial query is returned unchanged.
pub fn combined_query(initial: &str, answers: &[(String, String)]) -> String {
    if answers.is_empty() {
        return initial.to_string();
    }
    let qa = answers
        .iter()
        .map(|(q, a)| format!("Q: {q}\nA: {a}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Initial Query: {initial}\nFollow-up Questions and Answers:\n{qa}")
}

/// Wrap each item in `<tag>` markers, one per line.
pub(crate) fn tagged(tag: &str, items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("<{tag}>\n{item}\n</{tag}>"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_prompt_carries_date() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        let prompt = system_prompt_at(now);
        assert!(prompt.contains("Today is 2025-03-14."));
        assert!(prompt.starts_with("You are an expert researcher."));
    }

    #[test]
    fn combined_query_lists_answers() {
        let answers = vec![
            ("Which population?".to_string(), "Adults".to_string()),
            ("Time frame?".to_string(), "Last decade".to_string()),
        ];
        assert_eq!(
            combined_query("caffeine and sleep", &answers),
            "Initial Query: caffeine and sleep\nFollow-up Questions and Answers:\n\
             Q: Which population?\nA: Adults\nQ: Time frame?\nA: Last decade"
        );
    }

    #[test]
    fn combined_query_without_answers_is_identity() {
        assert_eq!(combined_query("q", &[]), "q");
    }

    #[test]
    fn tagged_wraps_each_item() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(tagged("learning", &items), "<learning>\na\n</learning>\n<learning>\nb\n</learning>");
    }
}
