//! Prompt-size management.
//!
//! Search snippets and accumulated learnings can be arbitrarily long, while
//! every model call has a finite context window. [`budget`] keeps prompts
//! within a token budget by trimming at natural text boundaries, with no
//! tokenizer dependency and no model call.

pub mod budget;

pub use budget::{
    DEFAULT_CHARS_PER_TOKEN, DEFAULT_CONTEXT_TOKENS, MIN_CHUNK_CHARS, PromptBudget, TextSplitter,
};
