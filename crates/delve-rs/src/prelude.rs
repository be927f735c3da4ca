//! Convenience re-exports for common types.
//!
//! ```ignore
//! use delve_rs::prelude::*;
//! ```

pub use crate::api::retry::{Resilient, RetryConfig};
pub use crate::config::{ConcurrencyMode, DelveConfig, ModelConfig, ResearchConfig, SearchConfig};
pub use crate::context::PromptBudget;
pub use crate::error::{CallError, ConfigError, ResearchError};
pub use crate::model::{GenerateRequest, LanguageModel, ModelFuture};
pub use crate::research::prompt::{combined_query, system_prompt};
pub use crate::research::{
    FnObserver, LatestProgress, LearningExtraction, LoggingObserver, NoopObserver,
    ProgressObserver, ResearchProgress, ResearchQuery, ResearchResult, Researcher,
};
pub use crate::search::{
    FirecrawlClient, SearchFuture, SearchLink, SearchProvider, SearchResult, placeholder_results,
};
pub use crate::structured::{RepairStage, SchemaDescriptor, Structured, StructuredOutput};
pub use crate::{ChatClient, json_schema_for};
