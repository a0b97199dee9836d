//! Token estimation and the short-term buffer budget.
//!
//! Uses a character-based heuristic: ~4 characters per token, plus a fixed
//! per-turn overhead for the role and delimiters on the wire. The same
//! estimate is used everywhere a token count is stored, so a buffer total is
//! always reproducible from its turns.

use sessionloom_config::MemoryConfig;
use serde::Serialize;

/// Tokens charged per turn for role name and formatting markers.
pub const TURN_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for one turn including per-turn overhead.
pub fn estimate_turn_tokens(text: &str) -> usize {
    TURN_OVERHEAD_TOKENS + estimate_tokens(text)
}

/// The configured size of the short-term buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    limit: usize,
    trigger_ratio: f32,
}

impl TokenBudget {
    pub fn new(limit: usize, trigger_ratio: f32) -> Self {
        Self {
            limit: limit.max(1),
            trigger_ratio: trigger_ratio.clamp(f32::EPSILON, 1.0),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.threshold_tokens, config.trigger_ratio)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Usage at or above which consolidation is due.
    pub fn trigger_at(&self) -> usize {
        ((self.limit as f32 * self.trigger_ratio).ceil() as usize).max(1)
    }

    pub fn status(&self, used: usize) -> BudgetStatus {
        BudgetStatus {
            used,
            limit: self.limit,
            trigger_at: self.trigger_at(),
        }
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

/// A point-in-time usage report for the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub used: usize,
    pub limit: usize,
    pub trigger_at: usize,
}

impl BudgetStatus {
    /// Fraction of the budget in use (may exceed 1.0).
    pub fn ratio(&self) -> f32 {
        self.used as f32 / self.limit as f32
    }

    pub fn needs_consolidation(&self) -> bool {
        self.used >= self.trigger_at
    }
}
