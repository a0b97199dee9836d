//! Query rewriter: turns an underspecified query into a self-contained one.
//!
//! Best effort: an unresolvable reference leaves the query unchanged, and a
//! capability failure returns the raw query with a degraded marker.

use serde::{Deserialize, Serialize};
use sessionloom_core::error::{CapabilityError, SchemaValidationError};
use sessionloom_core::message::Turn;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::capability::{StructuredClient, StructuredOutput};
use crate::context::MemoryContext;
use crate::prompts;

/// One reference the rewriter made explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub reference: String,
    pub entity: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RewritePayload {
    rewritten_query: String,
    #[serde(default)]
    resolved_references: Vec<ResolvedReference>,
}

impl StructuredOutput for RewritePayload {
    const SCHEMA_NAME: &'static str = "query_rewrite";

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["rewritten_query", "resolved_references"],
            "properties": {
                "rewritten_query": { "type": "string" },
                "resolved_references": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["reference", "entity"],
                        "properties": {
                            "reference": { "type": "string" },
                            "entity": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.rewritten_query.trim().is_empty() {
            return Err(SchemaValidationError::new(Self::SCHEMA_NAME, "rewritten_query is empty"));
        }
        Ok(())
    }
}

/// The query that goes on to generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenQuery {
    pub text: String,
    pub original: String,
    pub resolved: Vec<ResolvedReference>,
    /// Set when the rewrite fell back to the raw query after a failure.
    pub degraded: Option<CapabilityError>,
}

impl RewrittenQuery {
    pub fn unchanged(raw_query: &str) -> Self {
        Self {
            text: raw_query.to_string(),
            original: raw_query.to_string(),
            resolved: Vec::new(),
            degraded: None,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        self.text != self.original
    }
}

pub struct Rewriter {
    client: Arc<StructuredClient>,
}

impl Rewriter {
    pub fn new(client: Arc<StructuredClient>) -> Self {
        Self { client }
    }

    pub async fn rewrite(
        &self,
        raw_query: &str,
        recent_turns: &[Turn],
        memory: MemoryContext<'_>,
    ) -> RewrittenQuery {
        // Nothing to resolve against.
        if recent_turns.is_empty() && memory.is_empty() {
            return RewrittenQuery::unchanged(raw_query);
        }

        let prompt = prompts::rewriter_prompt(raw_query, recent_turns, memory);
        match self.client.invoke::<RewritePayload>(&prompt).await {
            Ok(invocation) => {
                let payload = invocation.value;
                let rewritten = RewrittenQuery {
                    text: payload.rewritten_query.trim().to_string(),
                    original: raw_query.to_string(),
                    resolved: payload.resolved_references,
                    degraded: None,
                };
                debug!(
                    rewritten = rewritten.is_rewritten(),
                    references = rewritten.resolved.len(),
                    "Query rewritten"
                );
                rewritten
            }
            Err(e) => {
                warn!(error = %e, "Rewriter degraded, using raw query");
                RewrittenQuery {
                    degraded: Some(e),
                    ..RewrittenQuery::unchanged(raw_query)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StagedSignals;
    use crate::test_helpers::{rewrite, ScriptedProvider};
    use sessionloom_core::memory::PersistedState;
    use sessionloom_core::message::Role;

    const SCHEMA: &str = RewritePayload::SCHEMA_NAME;

    fn rewriter(provider: Arc<ScriptedProvider>) -> Rewriter {
        Rewriter::new(Arc::new(StructuredClient::new(provider, "test-model")))
    }

    fn history() -> Vec<Turn> {
        vec![
            Turn::new(0, Role::User, "Tell me about Docker", 9),
            Turn::new(1, Role::Assistant, "Docker is a container runtime.", 12),
        ]
    }

    #[tokio::test]
    async fn resolves_reference_from_history() {
        let provider = Arc::new(ScriptedProvider::new().respond(
            SCHEMA,
            r#"{"rewritten_query": "How do I install Docker on Mac?",
                "resolved_references": [{"reference": "it", "entity": "Docker"}]}"#,
        ));
        let state = PersistedState::default();
        let staged = StagedSignals::default();
        let result = rewriter(provider)
            .rewrite("How do I install it on Mac?", &history(), MemoryContext::new(&state, &staged))
            .await;

        assert_eq!(result.text, "How do I install Docker on Mac?");
        assert_eq!(result.original, "How do I install it on Mac?");
        assert!(result.is_rewritten());
        assert_eq!(result.resolved[0].entity, "Docker");
        assert!(result.degraded.is_none());
    }

    #[tokio::test]
    async fn no_context_skips_the_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let state = PersistedState::default();
        let staged = StagedSignals::default();
        let result = rewriter(provider.clone())
            .rewrite("Write code for it", &[], MemoryContext::new(&state, &staged))
            .await;

        assert_eq!(result, RewrittenQuery::unchanged("Write code for it"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn failure_returns_raw_query_with_marker() {
        let provider = Arc::new(
            ScriptedProvider::new().fail(SCHEMA, CapabilityError::RateLimited { retry_after_secs: 5 }),
        );
        let state = PersistedState::default();
        let staged = StagedSignals::default();
        let result = rewriter(provider)
            .rewrite("How do I install it?", &history(), MemoryContext::new(&state, &staged))
            .await;

        assert_eq!(result.text, "How do I install it?");
        assert!(!result.is_rewritten());
        assert_eq!(result.degraded.map(|e| e.kind()), Some("rate_limit"));
    }

    #[tokio::test]
    async fn empty_rewrite_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new().respond(SCHEMA, &rewrite("   ")));
        let state = PersistedState::default();
        let staged = StagedSignals::default();
        let result = rewriter(provider)
            .rewrite("And the price?", &history(), MemoryContext::new(&state, &staged))
            .await;

        assert_eq!(result.text, "And the price?");
        assert_eq!(result.degraded.map(|e| e.kind()), Some("invalid_schema"));
    }

    #[tokio::test]
    async fn memory_alone_is_enough_context() {
        let provider = Arc::new(ScriptedProvider::new().respond(SCHEMA, &rewrite("Write Python code")));
        let mut state = PersistedState::default();
        state.constraints.insert("No Java code".into());
        let staged = StagedSignals::default();
        let result = rewriter(provider.clone())
            .rewrite("Write code", &[], MemoryContext::new(&state, &staged))
            .await;

        assert_eq!(result.text, "Write Python code");
        assert_eq!(provider.call_count(SCHEMA), 1);
    }
}
