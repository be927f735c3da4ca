//! Structured output: schema-shaped JSON from an untrusted text model.
//!
//! [`StructuredOutput::obtain`] never fails. It asks the model (through the
//! retry wrapper) for a bare JSON object, runs the reply through the
//! [`repair`] cascade, and falls back to a value synthesized from the
//! [`SchemaDescriptor`] (or an empty object) when nothing can be recovered.
//! The returned [`RepairStage`] tells callers which path produced the value,
//! so they can treat fallbacks as failures where that matters.

pub mod repair;
pub mod schema;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::retry::Resilient;
use crate::model::{GenerateRequest, LanguageModel};

pub use repair::RepairStage;
pub use schema::SchemaDescriptor;

/// Appended to every system prompt.
const JSON_SYSTEM_RULE: &str = "IMPORTANT: When asked to generate JSON, your response MUST be a valid, \
properly formatted JSON object ONLY, with no additional text before or after the JSON. Do not include \
markdown formatting, explanations, or any text that isn't part of the JSON object.";

/// Used when the caller supplies no system prompt.
const DEFAULT_JSON_SYSTEM: &str = "You are a helpful assistant that provides information in JSON format \
when requested.";

/// A recovered value and the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured {
    pub value: Value,
    pub stage: RepairStage,
}

impl Structured {
    /// Decode into `T`, unless the value is a fallback or does not fit.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        if self.stage.is_fallback() {
            return None;
        }
        serde_json::from_value(self.value.clone())
            .map_err(|e| debug!("Structured value does not decode: {e}"))
            .ok()
    }
}

/// Structured-output pipeline over a [`LanguageModel`].
#[derive(Clone)]
pub struct StructuredOutput {
    model: Arc<dyn LanguageModel>,
    resilient: Resilient,
}

impl StructuredOutput {
    pub fn new(model: Arc<dyn LanguageModel>, resilient: Resilient) -> Self {
        Self { model, resilient }
    }

    /// Ask for a structured value; always returns one.
    pub async fn obtain(
        &self,
        prompt: &str,
        system: &str,
        schema: Option<&SchemaDescriptor>,
        temperature: Option<f32>,
    ) -> Structured {
        let mut request = GenerateRequest::new(json_system(system), json_prompt(prompt, schema));
        request.schema = schema.map(|s| s.as_value().clone());
        request.temperature = temperature;

        let raw = self
            .resilient
            .call("generate", || self.model.generate(&request))
            .await;

        let raw = match raw {
            Ok(text) => text,
            Err(e) => {
                warn!("Structured generation failed: {e}");
                return fallback(schema);
            }
        };

        let Some((value, stage)) = repair::repair(&raw) else {
            let preview: String = raw.chars().take(120).collect();
            warn!("No JSON recoverable from model response: {preview:?}");
            return fallback(schema);
        };

        if stage != RepairStage::Direct {
            debug!("Recovered structured output via {stage:?}");
        }

        if is_empty(&value) {
            if let Some(schema) = schema {
                debug!("Model returned an empty value; using schema default");
                return Structured {
                    value: schema.default_value(),
                    stage: RepairStage::SchemaDefault,
                };
            }
        }

        if let Some(schema) = schema {
            schema.check(&value);
        }
        Structured { value, stage }
    }
}

fn fallback(schema: Option<&SchemaDescriptor>) -> Structured {
    match schema {
        Some(schema) => Structured {
            value: schema.default_value(),
            stage: RepairStage::SchemaDefault,
        },
        None => Structured {
            value: Value::Object(Map::new()),
            stage: RepairStage::Empty,
        },
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn json_system(system: &str) -> String {
    if system.trim().is_empty() {
        format!("{DEFAULT_JSON_SYSTEM} {JSON_SYSTEM_RULE}")
    } else {
        format!("{system}\n\n{JSON_SYSTEM_RULE}")
    }
}

fn json_prompt(prompt: &str, schema: Option<&SchemaDescriptor>) -> String {
    let mut out = format!(
        "{prompt}\n\nRespond with a single JSON object and nothing else: no code fences, no commentary."
    );
    if let Some(schema) = schema {
        out.push_str("\nThe JSON must conform to this JSON Schema:\n");
        out.push_str(&schema.to_prompt());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryConfig;
    use crate::error::CallError;
    use crate::mock::ScriptedModel;
    use serde::Deserialize;
    use serde_json::json;

    fn extraction_schema() -> SchemaDescriptor {
        SchemaDescriptor::from_value(json!({
            "type": "object",
            "properties": {
                "learnings": {"type": "array", "items": {"type": "string"}},
                "followUpQuestions": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["learnings", "followUpQuestions"]
        }))
    }

    fn pipeline(model: &Arc<ScriptedModel>) -> StructuredOutput {
        StructuredOutput::new(model.clone(), Resilient::new(RetryConfig::none()))
    }

    #[tokio::test]
    async fn well_formed_output_is_untouched() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"learnings":["a"],"followUpQuestions":["q"]}"#));
        let out = pipeline(&model)
            .obtain("p", "s", Some(&extraction_schema()), None)
            .await;
        assert_eq!(out.stage, RepairStage::Direct);
        assert_eq!(out.value, json!({"learnings": ["a"], "followUpQuestions": ["q"]}));
    }

    #[tokio::test]
    async fn prompt_and_system_carry_json_instructions() {
        let model = Arc::new(ScriptedModel::new().reply("{}"));
        let schema = extraction_schema();
        pipeline(&model).obtain("find things", "be precise", Some(&schema), Some(0.3)).await;

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let req = &calls[0];
        assert!(req.prompt.starts_with("find things"));
        assert!(req.prompt.contains("followUpQuestions"));
        assert!(req.system.starts_with("be precise"));
        assert!(req.system.contains("JSON object ONLY"));
        assert_eq!(req.schema.as_ref(), Some(schema.as_value()));
        assert_eq!(req.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn unrecoverable_output_with_schema_uses_default() {
        let model = Arc::new(ScriptedModel::new().reply("I cannot help with that."));
        let schema = extraction_schema();
        let out = pipeline(&model).obtain("p", "s", Some(&schema), None).await;
        assert_eq!(out.stage, RepairStage::SchemaDefault);
        let keys: Vec<_> = out.value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        for name in schema.property_names() {
            assert!(keys.contains(&name));
        }
    }

    #[tokio::test]
    async fn unrecoverable_output_without_schema_is_empty_object() {
        let model = Arc::new(ScriptedModel::new().reply("Just some prose."));
        let out = pipeline(&model).obtain("p", "s", None, None).await;
        assert_eq!(out.stage, RepairStage::Empty);
        assert_eq!(out.value, json!({}));
    }

    #[tokio::test]
    async fn empty_object_is_not_trusted_when_schema_known() {
        let model = Arc::new(ScriptedModel::new().reply("```json\n{}\n```"));
        let out = pipeline(&model)
            .obtain("p", "s", Some(&extraction_schema()), None)
            .await;
        assert_eq!(out.stage, RepairStage::SchemaDefault);
        assert!(out.value.get("learnings").is_some());
    }

    #[tokio::test]
    async fn call_failure_degrades_to_fallback() {
        let model = Arc::new(ScriptedModel::new().fail(CallError::Fatal("no key".into())));
        let out = pipeline(&model).obtain("p", "s", None, None).await;
        assert_eq!(out.stage, RepairStage::Empty);
        assert!(out.decode::<Map<String, Value>>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let model = Arc::new(
            ScriptedModel::new()
                .fail(CallError::Transient("reset".into()))
                .reply(r#"{"x": 1}"#),
        );
        let out = StructuredOutput::new(model.clone(), Resilient::default())
            .obtain("p", "", None, None)
            .await;
        assert_eq!(out.value, json!({"x": 1}));
        assert_eq!(model.calls().len(), 2);
    }

    #[test]
    fn decode_reads_recovered_values() {
        #[derive(Deserialize)]
        struct X {
            x: u32,
        }
        let s = Structured {
            value: json!({"x": 7}),
            stage: RepairStage::Repaired,
        };
        assert_eq!(s.decode::<X>().map(|v| v.x), Some(7));
    }

    #[test]
    fn blank_system_gets_default_persona() {
        assert!(json_system("  ").starts_with(DEFAULT_JSON_SYSTEM));
    }
}
