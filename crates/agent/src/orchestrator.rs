//! The turn orchestrator: the session state machine.
//!
//! ```text
//!   Idle ──input──▶ guardrail ──Clear──▶ rewrite ─▶ generate ─▶ Idle
//!                        │
//!                        └──Ambiguous──▶ AwaitingClarification
//!
//!   AwaitingClarification ──reply──▶ selects candidate ─▶ rewrite ─▶ generate ─▶ Idle
//!                                └─▶ anything else ─▶ guardrail (fresh turn)
//! ```
//!
//! Every input appends exactly one user turn and one assistant turn (the
//! answer, or the clarification prompt). After both are appended the budget
//! is checked and, if due, the buffer is consolidated. Component failures
//! degrade to their fallbacks and are published on the event bus; they never
//! fail the turn.

use chrono::Utc;
use serde::Serialize;
use sessionloom_config::AppConfig;
use sessionloom_core::error::{CapabilityError, Error, Result};
use sessionloom_core::event::{DomainEvent, EventBus};
use sessionloom_core::memory::{MergeReport, PersistedState, StateStore};
use sessionloom_core::message::{Role, SessionId};
use sessionloom_core::provider::Provider;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::budget::{BudgetStatus, TokenBudget};
use crate::buffer::SessionBuffer;
use crate::capability::StructuredClient;
use crate::clarify::{ClarificationReply, PendingClarification, SelectionMatcher};
use crate::consolidator::Consolidator;
use crate::context::{MemoryContext, StagedSignals};
use crate::generator::{ResponseGenerator, FALLBACK_ANSWER};
use crate::guardrail::{AmbiguityCandidate, AmbiguityKind, Guardrail, GuardrailCheck, Verdict};
use crate::rewriter::{RewrittenQuery, Rewriter};

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    /// Temperature for answer generation; analysis calls always use 0.
    pub temperature: f32,
    pub budget: TokenBudget,
    pub keep_tail_turns: usize,
    pub recent_turns: usize,
    pub selection_threshold: f32,
    pub guardrail_retries: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            budget: TokenBudget::from_config(&config.memory),
            keep_tail_turns: config.memory.keep_tail_turns,
            recent_turns: config.pipeline.recent_turns,
            selection_threshold: config.pipeline.selection_threshold,
            guardrail_retries: config.pipeline.guardrail_retries,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    AwaitingClarification,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::AwaitingClarification => f.write_str("awaiting_clarification"),
        }
    }
}

/// An answer for the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantResponse {
    pub text: String,
    /// The self-contained query the answer was generated for.
    pub query: String,
    pub rewritten: bool,
}

/// A request for the user to pick an interpretation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClarificationRequest {
    /// Rendered question with numbered choices.
    pub prompt: String,
    pub reason: AmbiguityKind,
    pub candidates: Vec<AmbiguityCandidate>,
}

/// What a turn produced. Exactly one per input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    AssistantResponse(AssistantResponse),
    ClarificationRequest(ClarificationRequest),
}

impl TurnOutcome {
    /// The text recorded as the assistant turn.
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::AssistantResponse(r) => &r.text,
            TurnOutcome::ClarificationRequest(c) => &c.prompt,
        }
    }

    pub fn is_clarification(&self) -> bool {
        matches!(self, TurnOutcome::ClarificationRequest(_))
    }
}

/// Result of the post-turn budget check.
#[derive(Debug, Clone, PartialEq)]
pub enum Maintenance {
    NotDue(BudgetStatus),
    /// Due, but everything in the buffer is inside the kept tail.
    NothingToFold,
    Consolidated(MergeReport),
    /// Due, but abandoned; the buffer is intact.
    Skipped(String),
}

/// Guardrail verdict plus the rewrite a clear input would get. No state changes.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub guardrail: GuardrailCheck,
    pub rewrite: Option<RewrittenQuery>,
}

#[derive(Debug, Clone, Copy)]
enum AnswerSource<'a> {
    Live,
    Recorded(&'a str),
}

/// Drives one session.
pub struct Orchestrator {
    session_id: SessionId,
    settings: PipelineSettings,
    guardrail: Guardrail,
    rewriter: Rewriter,
    generator: ResponseGenerator,
    consolidator: Consolidator,
    matcher: SelectionMatcher,
    store: Arc<dyn StateStore>,
    persisted: PersistedState,
    buffer: SessionBuffer,
    staged: StagedSignals,
    pending: Option<PendingClarification>,
    /// Turns dropped after no-op merges, credited to the next recorded batch.
    unrecorded_turns: usize,
    event_bus: Arc<EventBus>,
}

impl Orchestrator {
    /// Load persisted state and build the pipeline.
    ///
    /// A store that cannot be read or parsed fails here; state is never
    /// silently reset.
    pub async fn start(
        provider: Arc<dyn Provider>,
        store: Arc<dyn StateStore>,
        settings: PipelineSettings,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let persisted = store.load().await?;
        let session_id = SessionId::new();

        let client = Arc::new(StructuredClient::new(provider, settings.model.clone()));
        let guardrail = Guardrail::new(client.clone()).with_retries(settings.guardrail_retries);
        let rewriter = Rewriter::new(client.clone());
        let generator = ResponseGenerator::new(client.clone(), settings.temperature);
        let consolidator = Consolidator::new(client).with_keep_tail(settings.keep_tail_turns);
        let matcher = SelectionMatcher::new(settings.selection_threshold);

        info!(
            session_id = %session_id,
            store = store.name(),
            facts = persisted.profile.len(),
            constraints = persisted.constraints.len(),
            batches = persisted.batches,
            threshold = settings.budget.limit(),
            "Session started"
        );

        Ok(Self {
            session_id,
            settings,
            guardrail,
            rewriter,
            generator,
            consolidator,
            matcher,
            store,
            persisted,
            buffer: SessionBuffer::new(),
            staged: StagedSignals::default(),
            pending: None,
            unrecorded_turns: 0,
            event_bus,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> PipelineState {
        if self.pending.is_some() {
            PipelineState::AwaitingClarification
        } else {
            PipelineState::Idle
        }
    }

    pub fn pending(&self) -> Option<&PendingClarification> {
        self.pending.as_ref()
    }

    pub fn buffer(&self) -> &SessionBuffer {
        &self.buffer
    }

    /// The state as of the most recent successful consolidation.
    pub fn persisted(&self) -> &PersistedState {
        &self.persisted
    }

    pub fn staged(&self) -> &StagedSignals {
        &self.staged
    }

    /// Current buffer usage against the budget.
    pub fn usage(&self) -> BudgetStatus {
        self.settings.budget.status(self.buffer.total_tokens())
    }

    fn memory(&self) -> MemoryContext<'_> {
        MemoryContext::new(&self.persisted, &self.staged)
    }

    /// Process one live user input.
    pub async fn handle_turn(&mut self, input: &str) -> Result<TurnOutcome> {
        self.process(input, AnswerSource::Live).await
    }

    /// Process one input whose answer is already known (replay).
    ///
    /// The recorded answer replaces generation; it is ignored if the turn
    /// ends in a clarification request.
    pub async fn handle_recorded_turn(
        &mut self,
        input: &str,
        recorded_answer: Option<&str>,
    ) -> Result<TurnOutcome> {
        let source = match recorded_answer {
            Some(answer) if !answer.trim().is_empty() => AnswerSource::Recorded(answer),
            _ => AnswerSource::Live,
        };
        self.process(input, source).await
    }

    async fn process(&mut self, input: &str, source: AnswerSource<'_>) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidInput("empty user input".into()));
        }

        debug!(session_id = %self.session_id, state = %self.state(), "Turn received");
        self.event_bus.publish(DomainEvent::TurnReceived {
            session_id: self.session_id.to_string(),
            content_preview: input.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let outcome = match self.pending.take() {
            Some(pending) => self.resolve_pending(pending, input, source).await,
            None => self.fresh_turn(input, source).await,
        };

        // The answer is final before memory maintenance runs.
        self.maintain_memory().await;
        Ok(outcome)
    }

    async fn resolve_pending(
        &mut self,
        pending: PendingClarification,
        input: &str,
        source: AnswerSource<'_>,
    ) -> TurnOutcome {
        match self.matcher.classify(input, &pending) {
            ClarificationReply::Selected { candidate, option } => {
                let label = pending.candidates[candidate].interpretation_label.clone();
                info!(session_id = %self.session_id, interpretation = %label, "Clarification resolved");
                self.event_bus.publish(DomainEvent::ClarificationResolved {
                    session_id: self.session_id.to_string(),
                    interpretation: label,
                    timestamp: Utc::now(),
                });
                let query = pending.disambiguated_query(candidate, option);
                self.answer(input, &query, source).await
            }
            ClarificationReply::Abandoned => {
                info!(session_id = %self.session_id, "Clarification abandoned, treating input as a fresh turn");
                self.event_bus.publish(DomainEvent::ClarificationAbandoned {
                    session_id: self.session_id.to_string(),
                    timestamp: Utc::now(),
                });
                self.fresh_turn(input, source).await
            }
        }
    }

    async fn fresh_turn(&mut self, input: &str, source: AnswerSource<'_>) -> TurnOutcome {
        let check = self
            .guardrail
            .check(input, self.buffer.recent(self.settings.recent_turns), self.memory())
            .await;
        if let Some(e) = &check.degraded {
            self.report_degraded("guardrail", e);
        }

        let staged = self.staged.absorb(&check.new_facts, &check.new_preferences);
        if staged > 0 {
            debug!(staged, "Staged explicit facts and preferences");
        }

        match check.verdict {
            Verdict::Clear => self.answer(input, input, source).await,
            Verdict::Ambiguous { reason, candidates } => {
                self.request_clarification(input, reason, candidates)
            }
        }
    }

    fn request_clarification(
        &mut self,
        input: &str,
        reason: AmbiguityKind,
        candidates: Vec<AmbiguityCandidate>,
    ) -> TurnOutcome {
        let pending = PendingClarification {
            original_query: input.to_string(),
            reason,
            candidates,
        };
        let prompt = pending.prompt_text();

        self.buffer.push(Role::User, input);
        self.buffer.push(Role::Assistant, prompt.clone());

        info!(
            session_id = %self.session_id,
            reason = %reason,
            candidates = pending.candidates.len(),
            "Awaiting clarification"
        );
        self.event_bus.publish(DomainEvent::ClarificationRequested {
            session_id: self.session_id.to_string(),
            candidates: pending.candidates.len(),
            timestamp: Utc::now(),
        });

        let request = ClarificationRequest {
            prompt,
            reason,
            candidates: pending.candidates.clone(),
        };
        self.pending = Some(pending);
        TurnOutcome::ClarificationRequest(request)
    }

    async fn answer(&mut self, input: &str, query: &str, source: AnswerSource<'_>) -> TurnOutcome {
        let recent_turns = self.settings.recent_turns;
        let rewritten = self
            .rewriter
            .rewrite(query, self.buffer.recent(recent_turns), self.memory())
            .await;
        if let Some(e) = &rewritten.degraded {
            self.report_degraded("rewriter", e);
        }

        let text = match source {
            AnswerSource::Recorded(text) => text.trim().to_string(),
            AnswerSource::Live => match self
                .generator
                .generate(&rewritten.text, self.buffer.recent(recent_turns), self.memory())
                .await
            {
                Ok(answer) => {
                    self.event_bus.publish(DomainEvent::ResponseGenerated {
                        session_id: self.session_id.to_string(),
                        model: answer.model,
                        tokens_used: answer.tokens_used,
                        timestamp: Utc::now(),
                    });
                    answer.text
                }
                Err(e) => {
                    self.report_degraded("generator", &e);
                    FALLBACK_ANSWER.to_string()
                }
            },
        };

        self.buffer.push(Role::User, input);
        self.buffer.push(Role::Assistant, text.clone());

        TurnOutcome::AssistantResponse(AssistantResponse {
            text,
            rewritten: rewritten.is_rewritten(),
            query: rewritten.text,
        })
    }

    /// Check the budget and consolidate if due.
    ///
    /// Runs after every turn. A failed consolidation leaves the buffer and the
    /// persisted state exactly as they were; it is retried on the next breach.
    pub async fn maintain_memory(&mut self) -> Maintenance {
        let status = self.usage();
        info!(
            session_id = %self.session_id,
            tokens = status.used,
            threshold = status.trigger_at,
            "Buffer status"
        );
        self.event_bus.publish(DomainEvent::BudgetChecked {
            used: status.used,
            limit: status.limit,
            timestamp: Utc::now(),
        });

        if !status.needs_consolidation() {
            return Maintenance::NotDue(status);
        }

        let update = match self
            .consolidator
            .consolidate(self.buffer.turns(), self.memory())
            .await
        {
            Ok(Some(update)) => update,
            Ok(None) => return Maintenance::NothingToFold,
            Err(e) => {
                self.report_degraded("consolidator", &e);
                return self.skip_consolidation(format!("consolidation failed: {e}"));
            }
        };

        let folded = update.consumed_turns;
        let mut update = update;
        update.consumed_turns += self.unrecorded_turns;

        let mut next = self.persisted.clone();
        let report = next.merge(&update);
        if report.changed {
            if let Err(e) = self.store.save(&next).await {
                warn!(store = self.store.name(), error = %e, "Failed to persist consolidation");
                self.event_bus.publish(DomainEvent::ComponentDegraded {
                    component: "state_store".into(),
                    error_kind: "storage".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return self.skip_consolidation(format!("state not saved: {e}"));
            }
            self.persisted = next;
            self.unrecorded_turns = 0;
        } else {
            self.unrecorded_turns += folded;
            debug!(
                unrecorded_turns = self.unrecorded_turns,
                "Consolidation changed nothing, state not rewritten"
            );
        }

        let removed = self.buffer.truncate_front(folded);
        self.staged.clear();

        info!(
            session_id = %self.session_id,
            batch = report.batch,
            consumed = removed,
            updated_keys = ?report.updated_keys,
            remaining_tokens = self.buffer.total_tokens(),
            "Consolidation completed"
        );
        self.event_bus.publish(DomainEvent::ConsolidationCompleted {
            batch: report.batch,
            consumed_turns: removed,
            updated_keys: report.updated_keys.clone(),
            timestamp: Utc::now(),
        });

        Maintenance::Consolidated(report)
    }

    /// Run the guardrail (and the rewrite for a clear input) without
    /// recording anything.
    pub async fn analyze(&self, input: &str) -> QueryAnalysis {
        let recent = self.buffer.recent(self.settings.recent_turns);
        let guardrail = self.guardrail.check(input, recent, self.memory()).await;
        let rewrite = if guardrail.verdict.is_clear() {
            Some(self.rewriter.rewrite(input, recent, self.memory()).await)
        } else {
            None
        };
        QueryAnalysis { guardrail, rewrite }
    }

    fn skip_consolidation(&self, reason: String) -> Maintenance {
        warn!(session_id = %self.session_id, reason = %reason, "Consolidation skipped, buffer kept");
        self.event_bus.publish(DomainEvent::ConsolidationSkipped {
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        Maintenance::Skipped(reason)
    }

    fn report_degraded(&self, component: &str, error: &CapabilityError) {
        warn!(
            session_id = %self.session_id,
            component,
            error_kind = error.kind(),
            error = %error,
            "Component degraded"
        );
        self.event_bus.publish(DomainEvent::ComponentDegraded {
            component: component.to_string(),
            error_kind: error.kind().to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
