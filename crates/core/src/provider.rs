//! Provider trait: the opaque model capability.
//!
//! A Provider knows how to send a prompt to a language model and get back a
//! result constrained by an output schema. The pipeline never asks for free
//! text: every request carries an `OutputSchema`, and the raw content coming
//! back is parsed and validated by the caller.
//!
//! Implementations: OpenAI-compatible endpoints, scripted fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::CapabilityError;
use crate::message::Message;

/// A named JSON schema the model output must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Schema name (e.g., "guardrail_verdict"); also used for routing in fakes.
    pub name: String,

    /// JSON Schema describing the expected object
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The prompt messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// The structure the result must follow
    pub output_schema: OutputSchema,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Raw content; expected to be a JSON document matching the schema
    pub content: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Calls are blocking from the pipeline's point of view: a call completes,
/// errors, or times out per the provider's own contract. No cancellation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, CapabilityError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, CapabilityError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "messages": [],
            "output_schema": { "name": "answer", "schema": { "type": "object" } }
        }))
        .unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
        assert_eq!(req.output_schema.name, "answer");
    }

    #[test]
    fn output_schema_serialization() {
        let schema = OutputSchema::new(
            "generated_answer",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "answer": { "type": "string" }
                },
                "required": ["answer"]
            }),
        );
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("generated_answer"));
        assert!(json.contains("answer"));
    }
}
