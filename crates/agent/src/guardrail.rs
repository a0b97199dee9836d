//! Ambiguity guardrail: decides whether a fresh input is answerable as-is.
//!
//! Stateless: it knows nothing about pending clarifications. The orchestrator
//! bypasses it while one is active.
//!
//! Fails closed: if the capability is unreachable or its result does not
//! validate (after at most one synchronous retry), the verdict is `Clear` and
//! the error is handed back for reporting.

use serde::{Deserialize, Serialize};
use sessionloom_core::error::{CapabilityError, SchemaValidationError};
use sessionloom_core::message::Turn;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::{StructuredClient, StructuredOutput};
use crate::context::MemoryContext;
use crate::prompts;

/// Why an input was judged ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityKind {
    #[default]
    None,
    AmbiguousReference,
    AmbiguousTopic,
    IncompleteContext,
}

impl std::fmt::Display for AmbiguityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AmbiguityKind::None => "none",
            AmbiguityKind::AmbiguousReference => "ambiguous_reference",
            AmbiguityKind::AmbiguousTopic => "ambiguous_topic",
            AmbiguityKind::IncompleteContext => "incomplete_context",
        };
        f.write_str(s)
    }
}

/// One plausible reading of an ambiguous input. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityCandidate {
    pub interpretation_label: String,
    #[serde(default)]
    pub clarifying_question: String,
    #[serde(default)]
    pub option_values: Vec<String>,
}

/// The structured result requested from the capability.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailVerdict {
    pub is_ambiguous: bool,
    #[serde(default)]
    pub ambiguity_reason: AmbiguityKind,
    #[serde(default)]
    pub candidates: Vec<AmbiguityCandidate>,
    #[serde(default)]
    pub new_user_facts: Vec<String>,
    #[serde(default)]
    pub new_user_preferences: Vec<String>,
}

impl StructuredOutput for GuardrailVerdict {
    const SCHEMA_NAME: &'static str = "guardrail_verdict";

    fn schema() -> serde_json::Value {
        let strings = serde_json::json!({ "type": "array", "items": { "type": "string" } });
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": [
                "is_ambiguous",
                "ambiguity_reason",
                "candidates",
                "new_user_facts",
                "new_user_preferences"
            ],
            "properties": {
                "is_ambiguous": { "type": "boolean" },
                "ambiguity_reason": {
                    "type": "string",
                    "enum": ["none", "ambiguous_reference", "ambiguous_topic", "incomplete_context"]
                },
                "candidates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["interpretation_label", "clarifying_question", "option_values"],
                        "properties": {
                            "interpretation_label": { "type": "string" },
                            "clarifying_question": { "type": "string" },
                            "option_values": strings
                        }
                    }
                },
                "new_user_facts": strings,
                "new_user_preferences": strings
            }
        })
    }

    fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.is_ambiguous
            && !self
                .candidates
                .iter()
                .any(|c| !c.interpretation_label.trim().is_empty())
        {
            return Err(SchemaValidationError::new(
                Self::SCHEMA_NAME,
                "ambiguous verdict without any labelled candidate",
            ));
        }
        Ok(())
    }
}

/// The guardrail's decision for one input.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Clear,
    /// `candidates` is never empty.
    Ambiguous {
        reason: AmbiguityKind,
        candidates: Vec<AmbiguityCandidate>,
    },
}

impl Verdict {
    pub fn is_clear(&self) -> bool {
        matches!(self, Verdict::Clear)
    }
}

/// Full output of a guardrail check.
#[derive(Debug, Clone)]
pub struct GuardrailCheck {
    pub verdict: Verdict,
    pub new_facts: Vec<String>,
    pub new_preferences: Vec<String>,
    /// Set when the check failed closed.
    pub degraded: Option<CapabilityError>,
}

impl GuardrailCheck {
    fn fail_closed(error: CapabilityError) -> Self {
        Self {
            verdict: Verdict::Clear,
            new_facts: Vec::new(),
            new_preferences: Vec::new(),
            degraded: Some(error),
        }
    }
}

/// The ambiguity guardrail.
pub struct Guardrail {
    client: Arc<StructuredClient>,
    retries: u32,
}

impl Guardrail {
    pub fn new(client: Arc<StructuredClient>) -> Self {
        Self { client, retries: 1 }
    }

    /// Synchronous retries after a failed call; capped at one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.min(1);
        self
    }

    pub async fn check(
        &self,
        raw_query: &str,
        recent_turns: &[Turn],
        memory: MemoryContext<'_>,
    ) -> GuardrailCheck {
        let prompt = prompts::guardrail_prompt(raw_query, recent_turns, memory);

        let mut attempt = 0;
        let verdict = loop {
            match self.client.invoke::<GuardrailVerdict>(&prompt).await {
                Ok(invocation) => break invocation.value,
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Guardrail call failed, retrying once");
                }
                Err(e) => {
                    warn!(error = %e, "Guardrail failed closed to Clear");
                    return GuardrailCheck::fail_closed(e);
                }
            }
        };

        let check = into_check(verdict);
        match &check.verdict {
            Verdict::Clear => debug!(
                facts = check.new_facts.len(),
                preferences = check.new_preferences.len(),
                "Guardrail verdict: clear"
            ),
            Verdict::Ambiguous { reason, candidates } => info!(
                reason = %reason,
                candidates = candidates.len(),
                "Guardrail verdict: ambiguous"
            ),
        }
        check
    }
}

fn into_check(verdict: GuardrailVerdict) -> GuardrailCheck {
    let result = if verdict.is_ambiguous {
        let candidates: Vec<AmbiguityCandidate> = verdict
            .candidates
            .into_iter()
            .filter(|c| !c.interpretation_label.trim().is_empty())
            .collect();
        Verdict::Ambiguous {
            reason: match verdict.ambiguity_reason {
                AmbiguityKind::None => AmbiguityKind::AmbiguousTopic,
                other => other,
            },
            candidates,
        }
    } else {
        Verdict::Clear
    };

    GuardrailCheck {
        verdict: result,
        new_facts: verdict.new_user_facts,
        new_preferences: verdict.new_user_preferences,
        degraded: None,
    }
}
