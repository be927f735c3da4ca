//! Prompt budgeting: trims text to fit an estimated token budget without
//! calling a tokenizer or a model.
//!
//! Token counts are estimated from character counts. When text is over
//! budget, [`PromptBudget::fit`] narrows it to a prefix that ends on a
//! natural boundary (paragraph, line, sentence, clause, word), shrinking the
//! candidate on every step until it fits. If the narrowing would go below
//! [`MIN_CHUNK_CHARS`], the text is hard-cut to that many characters instead.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default prompt budget in tokens.
pub const DEFAULT_CONTEXT_TOKENS: usize = 128_000;

/// Smallest prefix [`PromptBudget::fit`] will narrow to before hard-cutting.
pub const MIN_CHUNK_CHARS: usize = 140;

/// Characters removed per overflowing token on each narrowing step.
const OVERFLOW_CHARS_PER_TOKEN: usize = 3;

/// Boundaries tried in order, coarsest first.
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " "];

/// Estimates token usage and trims prompts to a token budget.
///
/// # Example
///
/// ```
/// use delve_rs::context::PromptBudget;
///
/// let budget = PromptBudget::default();
/// let text = "First paragraph.\n\nSecond paragraph. ".repeat(200);
/// let fitted = budget.fit(&text, 100);
/// assert!(budget.estimate_tokens(fitted) <= 100);
/// assert!(text.starts_with(fitted));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBudget {
    /// Characters per token ratio (calibrated or default).
    chars_per_token: f64,
    splitter: TextSplitter,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self::with_calibration(None)
    }
}

impl PromptBudget {
    /// Create a budget with a calibrated chars-per-token ratio. Pass `None`
    /// to use [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn with_calibration(calibrated_cpt: Option<f64>) -> Self {
        let cpt = calibrated_cpt
            .filter(|c| *c >= 1.0)
            .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
        Self {
            chars_per_token: cpt,
            splitter: TextSplitter::default(),
        }
    }

    /// Replace the boundary splitter.
    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Estimated token count of `text`.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }

    /// Return the longest natural-boundary prefix of `text` whose estimated
    /// token count is within `max_tokens`.
    ///
    /// Text already within budget is returned unchanged, so applying `fit`
    /// twice gives the same result as applying it once. Budgets smaller than
    /// [`MIN_CHUNK_CHARS`] worth of tokens yield a 140-character prefix.
    pub fn fit<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        let mut current = text;
        loop {
            let tokens = self.estimate_tokens(current);
            if tokens <= max_tokens {
                return current;
            }

            let chars = current.chars().count();
            let overflow = tokens - max_tokens;
            let chunk_size = chars.saturating_sub(overflow * OVERFLOW_CHARS_PER_TOKEN);
            if chunk_size < MIN_CHUNK_CHARS {
                return prefix_chars(current, MIN_CHUNK_CHARS);
            }

            let narrowed = self.splitter.first_chunk(current, chunk_size);
            current = if narrowed.is_empty() || narrowed.len() >= current.len() {
                prefix_chars(current, chunk_size)
            } else {
                narrowed
            };
        }
    }
}

/// Splits text at the coarsest available natural boundary.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()))
    }
}

impl TextSplitter {
    /// Create a splitter that tries `separators` in order.
    pub fn new(separators: impl IntoIterator<Item = String>) -> Self {
        Self {
            separators: separators.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// The first chunk of `text` holding at most `max_chars` characters.
    ///
    /// Cuts after the last occurrence of the coarsest separator found in
    /// the window; punctuation in the separator stays with the chunk and
    /// trailing whitespace is dropped. Falls back to a hard cut when no
    /// separator occurs in the window.
    pub fn first_chunk<'a>(&self, text: &'a str, max_chars: usize) -> &'a str {
        let window = prefix_chars(text, max_chars);
        if window.len() == text.len() {
            return text;
        }

        for sep in &self.separators {
            let Some(pos) = window.rfind(sep.as_str()) else {
                continue;
            };
            let end = pos + sep.trim_end().len();
            if let Some(chunk) = window.get(..end) {
                let chunk = chunk.trim_end();
                if !chunk.is_empty() {
                    return chunk;
                }
            }
        }

        window
    }
}

/// The first `n` characters of `text` (all of it when shorter).
pub fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => text.get(..idx).unwrap_or(text),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        let budget = PromptBudget::default();
        assert_eq!(budget.estimate_tokens(""), 0);
        assert_eq!(budget.estimate_tokens("abc"), 1);
        assert_eq!(budget.estimate_tokens(&"a".repeat(35)), 10);
        assert_eq!(budget.estimate_tokens(&"a".repeat(36)), 11);
    }

    #[test]
    fn calibrated_budget_uses_custom_ratio() {
        let default = PromptBudget::default();
        let calibrated = PromptBudget::with_calibration(Some(4.0));
        let text = "a".repeat(40_000);
        assert!(calibrated.estimate_tokens(&text) < default.estimate_tokens(&text));
    }

    #[test]
    fn nonsensical_calibration_falls_back() {
        let budget = PromptBudget::with_calibration(Some(0.0));
        assert_eq!(budget.chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
    }

    #[test]
    fn under_budget_is_unchanged() {
        let budget = PromptBudget::default();
        let text = "short prompt";
        assert_eq!(budget.fit(text, 100), text);
        assert_eq!(budget.fit("", 0), "");
    }

    #[test]
    fn over_budget_fits_and_is_prefix() {
        let budget = PromptBudget::default();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(500);
        for max in [40, 100, 1000, 5000] {
            let fitted = budget.fit(&text, max);
            assert!(
                budget.estimate_tokens(fitted) <= max,
                "budget {max}: got {} tokens",
                budget.estimate_tokens(fitted)
            );
            assert!(text.starts_with(fitted));
        }
    }

    #[test]
    fn fit_is_idempotent() {
        let budget = PromptBudget::default();
        let text = "Paragraph one is here.\n\nParagraph two follows. ".repeat(300);
        let once = budget.fit(&text, 500);
        assert_eq!(budget.fit(once, 500), once);
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let budget = PromptBudget::default();
        let text = "Alpha beta gamma delta. ".repeat(100);
        let fitted = budget.fit(&text, 200);
        assert!(fitted.ends_with('.'), "got {:?}", &fitted[fitted.len() - 10..]);
    }

    #[test]
    fn tiny_budget_hard_cuts_to_floor() {
        let budget = PromptBudget::default();
        let text = "x".repeat(10_000);
        let fitted = budget.fit(&text, 5);
        assert_eq!(fitted.chars().count(), MIN_CHUNK_CHARS);
    }

    #[test]
    fn text_without_separators_still_terminates() {
        let budget = PromptBudget::default();
        let text = "z".repeat(50_000);
        let fitted = budget.fit(&text, 1000);
        assert!(budget.estimate_tokens(fitted) <= 1000);
        assert!(fitted.len() > MIN_CHUNK_CHARS);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let budget = PromptBudget::default();
        let text = "天空为什么是蓝色的 ".repeat(2000);
        let fitted = budget.fit(&text, 300);
        assert!(budget.estimate_tokens(fitted) <= 300);
        assert!(text.starts_with(fitted));
    }

    #[test]
    fn splitter_prefers_paragraphs_over_sentences() {
        let splitter = TextSplitter::default();
        let text = "One. Two.\n\nThree. Four. Five six seven eight nine ten";
        let chunk = splitter.first_chunk(text, 30);
        assert_eq!(chunk, "One. Two.");
    }

    #[test]
    fn splitter_returns_whole_text_when_it_fits() {
        let splitter = TextSplitter::default();
        assert_eq!(splitter.first_chunk("tiny", 100), "tiny");
    }

    #[test]
    fn splitter_hard_cuts_without_separators() {
        let splitter = TextSplitter::new(vec!["|".to_string()]);
        assert_eq!(splitter.first_chunk("abcdefghij", 4), "abcd");
    }

    #[test]
    fn prefix_chars_handles_short_text() {
        assert_eq!(prefix_chars("abc", 10), "abc");
        assert_eq!(prefix_chars("abcdef", 3), "abc");
        assert_eq!(prefix_chars("ünïcode", 2), "ün");
    }
}
