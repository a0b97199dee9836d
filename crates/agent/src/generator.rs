//! Response generation through the opaque capability.

use serde::Deserialize;
use sessionloom_core::error::{CapabilityError, SchemaValidationError};
use sessionloom_core::message::Turn;
use std::sync::Arc;
use tracing::debug;

use crate::capability::{StructuredClient, StructuredOutput};
use crate::context::MemoryContext;
use crate::prompts;

/// Shown when generation fails; the raw error is logged instead.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't come up with an answer just now. Please try again in a moment.";

#[derive(Debug, Clone, Deserialize)]
struct GeneratedAnswer {
    answer: String,
}

impl StructuredOutput for GeneratedAnswer {
    const SCHEMA_NAME: &'static str = "generated_answer";

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["answer"],
            "properties": { "answer": { "type": "string" } }
        })
    }

    fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.answer.trim().is_empty() {
            return Err(SchemaValidationError::new(Self::SCHEMA_NAME, "answer is empty"));
        }
        Ok(())
    }
}

/// A generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub model: String,
    pub tokens_used: u32,
}

pub struct ResponseGenerator {
    client: Arc<StructuredClient>,
    temperature: f32,
}

impl ResponseGenerator {
    pub fn new(client: Arc<StructuredClient>, temperature: f32) -> Self {
        Self { client, temperature }
    }

    pub async fn generate(
        &self,
        query: &str,
        recent_turns: &[Turn],
        memory: MemoryContext<'_>,
    ) -> Result<Answer, CapabilityError> {
        let prompt = prompts::generation_prompt(query, recent_turns, memory, self.temperature);
        let invocation = self.client.invoke::<GeneratedAnswer>(&prompt).await?;

        debug!(model = %invocation.model, tokens = invocation.tokens_used, "Answer generated");
        Ok(Answer {
            text: invocation.value.answer.trim().to_string(),
            model: invocation.model,
            tokens_used: invocation.tokens_used,
        })
    }
}
