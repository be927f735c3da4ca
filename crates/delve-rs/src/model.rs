//! The language-model capability.
//!
//! Research code sees a model only through [`LanguageModel::generate`]: a
//! prompt goes in, raw text (or a single-attempt [`CallError`]) comes out.
//! Retries, JSON repair and fallbacks are layered on top by
//! [`Resilient`](crate::api::retry::Resilient) and
//! [`StructuredOutput`](crate::structured::StructuredOutput).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::ChatClient;
use crate::error::CallError;

/// Return type of [`LanguageModel::generate`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, CallError>> + Send + 'a>>;

/// One generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: String,
    /// JSON Schema of the expected output. When present the model is asked
    /// for structured output only.
    pub schema: Option<Value>,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text-generation backend.
///
/// Implementations perform exactly one attempt per call and must be safe to
/// call from many research branches at once.
///
/// # Example
///
/// ```
/// use delve_rs::model::{GenerateRequest, LanguageModel, ModelFuture};
///
/// struct Echo;
///
/// impl LanguageModel for Echo {
///     fn generate(&self, request: &GenerateRequest) -> ModelFuture<'_> {
///         let text = request.prompt.clone();
///         Box::pin(async move { Ok(text) })
///     }
/// }
/// ```
pub trait LanguageModel: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> ModelFuture<'_>;
}

impl LanguageModel for ChatClient {
    fn generate(&self, request: &GenerateRequest) -> ModelFuture<'_> {
        let body = self.request(
            &request.system,
            &request.prompt,
            request.temperature,
            request.schema.is_some(),
        );
        Box::pin(async move { self.chat(&body).await.map(|c| c.content) })
    }
}
