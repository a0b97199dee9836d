//! Memory consolidator: folds the buffer into durable facts and a summary.
//!
//! It only proposes a `StateUpdate`; merging, persisting and truncating the
//! buffer belong to the orchestrator. `consumed_turns` tells it exactly how
//! many leading turns were folded in.

use serde::Deserialize;
use sessionloom_core::error::{CapabilityError, SchemaValidationError};
use sessionloom_core::memory::{FactUpdate, StateUpdate, SummaryHighlights};
use sessionloom_core::message::Turn;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capability::{StructuredClient, StructuredOutput};
use crate::context::MemoryContext;
use crate::prompts;

#[derive(Debug, Clone, Deserialize)]
struct ConsolidationPayload {
    #[serde(default)]
    profile_updates: Vec<FactUpdate>,
    #[serde(default)]
    constraint_updates: Vec<String>,
    summary: String,
    #[serde(default)]
    key_facts: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default)]
    open_questions: Vec<String>,
    #[serde(default)]
    todos: Vec<String>,
}

impl StructuredOutput for ConsolidationPayload {
    const SCHEMA_NAME: &'static str = "memory_consolidation";

    fn schema() -> serde_json::Value {
        let strings = serde_json::json!({ "type": "array", "items": { "type": "string" } });
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": [
                "profile_updates",
                "constraint_updates",
                "summary",
                "key_facts",
                "decisions",
                "open_questions",
                "todos"
            ],
            "properties": {
                "profile_updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["key", "value"],
                        "properties": {
                            "key": { "type": "string" },
                            "value": { "type": "string" }
                        }
                    }
                },
                "constraint_updates": strings,
                "summary": { "type": "string" },
                "key_facts": strings,
                "decisions": strings,
                "open_questions": strings,
                "todos": strings
            }
        })
    }

    fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.summary.trim().is_empty() {
            return Err(SchemaValidationError::new(Self::SCHEMA_NAME, "summary is empty"));
        }
        if let Some(fact) = self.profile_updates.iter().find(|f| f.key.trim().is_empty()) {
            return Err(SchemaValidationError::new(
                Self::SCHEMA_NAME,
                format!("profile update with empty key (value: {})", fact.value),
            ));
        }
        Ok(())
    }
}

pub struct Consolidator {
    client: Arc<StructuredClient>,
    keep_tail_turns: usize,
}

impl Consolidator {
    pub fn new(client: Arc<StructuredClient>) -> Self {
        Self {
            client,
            keep_tail_turns: 0,
        }
    }

    /// Leave the most recent `n` turns raw after a consolidation.
    pub fn with_keep_tail(mut self, n: usize) -> Self {
        self.keep_tail_turns = n;
        self
    }

    /// Propose an update from the leading turns of `buffer`.
    ///
    /// Returns `Ok(None)` when there is nothing beyond the kept tail to fold.
    /// The prior summary and profile are part of the prompt so the new
    /// summary is cumulative.
    pub async fn consolidate(
        &self,
        buffer: &[Turn],
        memory: MemoryContext<'_>,
    ) -> Result<Option<StateUpdate>, CapabilityError> {
        let consumed = buffer.len().saturating_sub(self.keep_tail_turns);
        if consumed == 0 {
            debug!(buffered = buffer.len(), "Nothing to consolidate");
            return Ok(None);
        }

        let turns = &buffer[..consumed];
        let prompt = prompts::consolidator_prompt(turns, memory);
        let payload = self
            .client
            .invoke::<ConsolidationPayload>(&prompt)
            .await?
            .value;

        info!(
            consumed,
            profile_updates = payload.profile_updates.len(),
            constraint_updates = payload.constraint_updates.len(),
            "Consolidation proposed"
        );

        Ok(Some(StateUpdate {
            profile_updates: payload.profile_updates,
            constraint_updates: payload.constraint_updates,
            summary: payload.summary,
            highlights: SummaryHighlights {
                key_facts: payload.key_facts,
                decisions: payload.decisions,
                open_questions: payload.open_questions,
                todos: payload.todos,
            },
            consumed_turns: consumed,
        }))
    }
}
