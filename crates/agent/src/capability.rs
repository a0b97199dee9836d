//! Structured invocation of the opaque model capability.
//!
//! Every pipeline component talks to the model through `StructuredClient`:
//! it sends a prompt with the output schema of the expected type, parses the
//! raw content into that type, and validates it. Anything that does not
//! conform surfaces as `CapabilityError::InvalidSchema`.

use serde::de::DeserializeOwned;
use sessionloom_core::error::{CapabilityError, SchemaValidationError};
use sessionloom_core::message::Message;
use sessionloom_core::provider::{OutputSchema, Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

/// A typed result the model can be asked to produce.
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Schema name sent with the request.
    const SCHEMA_NAME: &'static str;

    /// JSON Schema of the expected object.
    fn schema() -> serde_json::Value;

    /// Semantic checks the JSON Schema cannot express.
    fn validate(&self) -> Result<(), SchemaValidationError> {
        Ok(())
    }

    fn output_schema() -> OutputSchema {
        OutputSchema::new(Self::SCHEMA_NAME, Self::schema())
    }
}

/// A system/user prompt pair.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl Prompt {
    /// A deterministic prompt (temperature 0).
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A parsed result along with who produced it.
#[derive(Debug, Clone)]
pub struct Invocation<T> {
    pub value: T,
    pub model: String,
    pub tokens_used: u32,
}

/// Sends structured requests to a provider on behalf of pipeline components.
pub struct StructuredClient {
    provider: Arc<dyn Provider>,
    model: String,
}

impl StructuredClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Invoke the capability and parse the result as `T`.
    pub async fn invoke<T: StructuredOutput>(
        &self,
        prompt: &Prompt,
    ) -> Result<Invocation<T>, CapabilityError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(prompt.system.clone()),
                Message::user(prompt.user.clone()),
            ],
            temperature: prompt.temperature,
            max_tokens: None,
            output_schema: T::output_schema(),
        };

        debug!(
            provider = %self.provider.name(),
            schema = T::SCHEMA_NAME,
            prompt_chars = prompt.user.len(),
            "Invoking capability"
        );

        let response = self.provider.complete(request).await?;
        let value = parse_structured::<T>(&response.content)?;

        Ok(Invocation {
            value,
            model: response.model,
            tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

/// Parse and validate raw model content as `T`.
pub fn parse_structured<T: StructuredOutput>(content: &str) -> Result<T, CapabilityError> {
    let body = strip_code_fence(content);
    let value: T = serde_json::from_str(body).map_err(|e| {
        CapabilityError::InvalidSchema(format!("{}: {e}", T::SCHEMA_NAME))
    })?;
    value.validate()?;
    Ok(value)
}

/// Some endpoints wrap JSON in a markdown fence even in structured mode.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
