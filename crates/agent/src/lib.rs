//! The session-state pipeline: the heart of sessionloom.
//!
//! Per user turn the orchestrator decides:
//!
//! 1. **Clarify or proceed**: the guardrail flags inputs with several plausible
//!    readings and the pipeline asks the user to pick one
//! 2. **Rewrite**: implicit references are resolved against recent turns and
//!    remembered facts, producing a self-contained query
//! 3. **Answer**: the generator answers with the user's profile and
//!    constraints injected
//! 4. **Consolidate**: once the short-term buffer crosses its token budget it
//!    is folded into durable profile facts and a rolling summary
//!
//! All model calls go through the opaque `Provider` capability with a typed
//! output schema; every failure degrades to a documented fallback.

pub mod budget;
pub mod buffer;
pub mod capability;
pub mod clarify;
pub mod consolidator;
pub mod context;
pub mod generator;
pub mod guardrail;
pub mod orchestrator;
pub mod prompts;
pub mod replay;
pub mod rewriter;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use budget::{estimate_tokens, estimate_turn_tokens, BudgetStatus, TokenBudget};
pub use buffer::SessionBuffer;
pub use capability::{Prompt, StructuredClient, StructuredOutput};
pub use clarify::{ClarificationReply, PendingClarification, SelectionMatcher};
pub use consolidator::Consolidator;
pub use context::{MemoryContext, StagedSignals};
pub use generator::{Answer, ResponseGenerator, FALLBACK_ANSWER};
pub use guardrail::{AmbiguityCandidate, AmbiguityKind, Guardrail, GuardrailCheck, Verdict};
pub use orchestrator::{
    AssistantResponse, ClarificationRequest, Maintenance, Orchestrator, PipelineSettings,
    PipelineState, QueryAnalysis, TurnOutcome,
};
pub use replay::{load_replay_log, parse_replay_log, replay, ReplayRecord, ReplayStep};
pub use rewriter::{ResolvedReference, RewrittenQuery, Rewriter};
