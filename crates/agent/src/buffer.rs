//! The session buffer: short-term memory of raw turns.
//!
//! Append-only between consolidations. The orchestrator is the only owner;
//! it truncates the front after a consolidation has been persisted.

use sessionloom_core::message::{Role, Turn};

use crate::budget::estimate_turn_tokens;

/// Ordered turns of the current session plus their running token total.
#[derive(Debug, Clone, Default)]
pub struct SessionBuffer {
    turns: Vec<Turn>,
    total_tokens: usize,
    /// Index the next appended turn receives; never reused within a session.
    next_index: u64,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it.
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> &Turn {
        let text = text.into();
        let tokens = estimate_turn_tokens(&text);
        let turn = Turn::new(self.next_index, role, text, tokens);

        self.next_index += 1;
        self.total_tokens += tokens;
        self.turns.push(turn);
        debug_assert_eq!(self.total_tokens, self.recompute_tokens());

        &self.turns[self.turns.len() - 1]
    }

    /// Drop the `count` oldest turns. Returns how many were removed.
    pub fn truncate_front(&mut self, count: usize) -> usize {
        let count = count.min(self.turns.len());
        let removed: usize = self.turns.drain(..count).map(|t| t.token_count()).sum();
        self.total_tokens -= removed;
        debug_assert_eq!(self.total_tokens, self.recompute_tokens());
        count
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Running token total, maintained on every append and truncation.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Token total recomputed from the turns themselves.
    pub fn recompute_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.token_count()).sum()
    }
}
