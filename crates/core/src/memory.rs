//! Persisted memory: the durable aggregate carried across sessions.
//!
//! `PersistedState` holds everything the pipeline remembers about a user once
//! the raw turns are gone: profile facts with provenance, standing
//! constraints, and a rolling summary. Only a successful consolidation changes
//! it, and the `StateStore` writes it back in full.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::error::StorageError;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// A half-open range of turns `[start, end)` counted across all
/// consolidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRange {
    pub start: u64,
    pub end: u64,
}

/// Which consolidation batch last changed a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactProvenance {
    pub batch: u64,
    pub turns: TurnRange,
}

/// A single profile fact value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFact {
    pub value: String,
    pub provenance: FactProvenance,
}

/// Fact-key → fact mapping. Keys are unique; newer batches win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile {
    facts: BTreeMap<String, ProfileFact>,
}

impl UserProfile {
    pub fn get(&self, key: &str) -> Option<&ProfileFact> {
        self.facts.get(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProfileFact)> {
        self.facts.iter()
    }

    /// Insert or overwrite a fact. Returns `true` when the stored value changed.
    ///
    /// Writing the value a key already holds keeps the original provenance.
    pub fn upsert(&mut self, key: &str, value: &str, provenance: FactProvenance) -> bool {
        let key = normalize_fact_key(key);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return false;
        }
        if self.facts.get(&key).is_some_and(|f| f.value == value) {
            return false;
        }
        self.facts.insert(
            key,
            ProfileFact {
                value: value.to_string(),
                provenance,
            },
        );
        true
    }
}

/// Normalize a fact key: lowercase snake_case, punctuation dropped.
pub fn normalize_fact_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Structured highlights that accompany the rolling summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryHighlights {
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub todos: Vec<String>,
}

impl SummaryHighlights {
    pub fn is_empty(&self) -> bool {
        self.key_facts.is_empty()
            && self.decisions.is_empty()
            && self.open_questions.is_empty()
            && self.todos.is_empty()
    }
}

/// The durable aggregate owned by the `StateStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,

    #[serde(default)]
    pub profile: UserProfile,

    /// Standing behavioral directives; deduplicated, unordered.
    #[serde(default)]
    pub constraints: BTreeSet<String>,

    /// Rolling natural-language digest; replaced on every consolidation.
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub highlights: SummaryHighlights,

    /// Number of consolidations that changed this state.
    #[serde(default)]
    pub batches: u64,

    /// Turns folded in so far, across sessions.
    #[serde(default)]
    pub consolidated_turns: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            profile: UserProfile::default(),
            constraints: BTreeSet::new(),
            summary: String::new(),
            highlights: SummaryHighlights::default(),
            batches: 0,
            consolidated_turns: 0,
            updated_at: None,
        }
    }
}

/// One key/value pair proposed for the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactUpdate {
    pub key: String,
    pub value: String,
}

/// Everything a consolidation wants to merge into the persisted state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub profile_updates: Vec<FactUpdate>,
    pub constraint_updates: Vec<String>,
    pub summary: String,
    pub highlights: SummaryHighlights,
    pub consumed_turns: usize,
}

/// What a merge actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub changed: bool,
    pub batch: u64,
    pub updated_keys: Vec<String>,
    pub added_constraints: usize,
}

impl PersistedState {
    /// True when nothing has been remembered yet.
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
            && self.constraints.is_empty()
            && self.summary.is_empty()
            && self.highlights.is_empty()
    }

    /// Merge a consolidation result.
    ///
    /// Profile updates overwrite same-key facts, constraints are unioned, the
    /// summary and highlights are replaced. An empty summary keeps the prior
    /// one, and so do the highlights unless the update brings new ones.
    /// A merge that changes nothing leaves the state untouched, counters
    /// included, so re-applying the same update is a no-op. Callers that drop
    /// turns after a no-op merge fold their count into the next update's
    /// `consumed_turns` to keep provenance ranges contiguous.
    pub fn merge(&mut self, update: &StateUpdate) -> MergeReport {
        let batch = self.batches + 1;
        let start = self.consolidated_turns;
        let provenance = FactProvenance {
            batch,
            turns: TurnRange {
                start,
                end: start + update.consumed_turns as u64,
            },
        };

        let mut updated_keys = Vec::new();
        for fact in &update.profile_updates {
            if self.profile.upsert(&fact.key, &fact.value, provenance) {
                let key = normalize_fact_key(&fact.key);
                if !updated_keys.contains(&key) {
                    updated_keys.push(key);
                }
            }
        }

        let mut added_constraints = 0;
        for constraint in &update.constraint_updates {
            let constraint = constraint.trim();
            if !constraint.is_empty() && self.constraints.insert(constraint.to_string()) {
                added_constraints += 1;
            }
        }

        let mut changed = !updated_keys.is_empty() || added_constraints > 0;

        let summary = update.summary.trim();
        if !summary.is_empty() && summary != self.summary {
            self.summary = summary.to_string();
            changed = true;
        }

        let fresh_cycle = !summary.is_empty() || !update.highlights.is_empty();
        if fresh_cycle && update.highlights != self.highlights {
            self.highlights = update.highlights.clone();
            changed = true;
        }

        if !changed {
            return MergeReport {
                changed: false,
                batch: self.batches,
                ..MergeReport::default()
            };
        }

        self.batches = batch;
        self.consolidated_turns = provenance.turns.end;
        self.updated_at = Some(Utc::now());

        MergeReport {
            changed: true,
            batch,
            updated_keys,
            added_constraints,
        }
    }
}

/// Durable storage for `PersistedState`.
///
/// Loaded in full at session start, overwritten in full on each successful
/// consolidation. Implementations assume a single writer.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The store name (e.g., "json_file", "in_memory").
    fn name(&self) -> &str;

    /// Load the state. A missing record yields an empty state; an unreadable
    /// one is an error.
    async fn load(&self) -> std::result::Result<PersistedState, StorageError>;

    /// Replace the stored state atomically.
    async fn save(&self, state: &PersistedState) -> std::result::Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(facts: &[(&str, &str)], constraints: &[&str], summary: &str) -> StateUpdate {
        StateUpdate {
            profile_updates: facts
                .iter()
                .map(|(k, v)| FactUpdate {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            constraint_updates: constraints.iter().map(|c| c.to_string()).collect(),
            summary: summary.into(),
            highlights: SummaryHighlights::default(),
            consumed_turns: 4,
        }
    }

    #[test]
    fn fact_keys_are_normalized() {
        assert_eq!(normalize_fact_key("Job Title"), "job_title");
        assert_eq!(normalize_fact_key(" tech-stack  preference "), "tech_stack_preference");
        assert_eq!(normalize_fact_key("name!"), "name");
        assert_eq!(normalize_fact_key("  "), "");
    }

    #[test]
    fn merge_records_provenance() {
        let mut state = PersistedState::default();
        let report = state.merge(&update(&[("job_title", "student")], &["No Java code"], "Intro."));

        assert!(report.changed);
        assert_eq!(report.batch, 1);
        assert_eq!(report.updated_keys, vec!["job_title".to_string()]);
        assert_eq!(report.added_constraints, 1);
        let fact = state.profile.get("job_title").unwrap();
        assert_eq!(fact.value, "student");
        assert_eq!(fact.provenance.batch, 1);
        assert_eq!(fact.provenance.turns, TurnRange { start: 0, end: 4 });
        assert_eq!(state.consolidated_turns, 4);
        assert!(state.updated_at.is_some());
        assert!(!state.is_empty());
        assert!(PersistedState::default().is_empty());
    }

    #[test]
    fn newer_batch_overrides_same_key() {
        let mut state = PersistedState::default();
        state.merge(&update(&[("language", "Java")], &[], "first"));
        state.merge(&update(&[("Language", "Python")], &[], "second"));

        let fact = state.profile.get("language").unwrap();
        assert_eq!(fact.value, "Python");
        assert_eq!(fact.provenance.batch, 2);
        assert_eq!(state.profile.len(), 1);
        assert_eq!(state.summary, "second");
    }

    #[test]
    fn constraints_are_unioned_and_deduplicated() {
        let mut state = PersistedState::default();
        state.merge(&update(&[], &["No Java code", "Be concise"], "s1"));
        state.merge(&update(&[], &["Be concise ", "Use metric units"], "s2"));

        assert_eq!(state.constraints.len(), 3);
        assert!(state.constraints.contains("No Java code"));
    }

    #[test]
    fn reapplying_same_update_is_noop() {
        let mut state = PersistedState::default();
        let u = update(&[("name", "Huy")], &["Hates Java"], "User is Huy.");
        state.merge(&u);
        let snapshot = state.clone();

        let report = state.merge(&u);
        assert!(!report.changed);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn empty_summary_keeps_prior_digest() {
        let mut state = PersistedState::default();
        state.merge(&update(&[], &[], "Discussed Docker."));
        state.merge(&update(&[("os", "macOS")], &[], "  "));
        assert_eq!(state.summary, "Discussed Docker.");
    }

    #[test]
    fn new_cycle_without_highlights_clears_old_ones() {
        let mut state = PersistedState::default();
        state.merge(&StateUpdate {
            highlights: SummaryHighlights {
                todos: vec!["Install Docker".into()],
                ..SummaryHighlights::default()
            },
            ..update(&[], &[], "Planning the Docker setup.")
        });
        assert_eq!(state.highlights.todos, vec!["Install Docker".to_string()]);

        let report = state.merge(&update(&[], &[], "Docker is installed and running."));
        assert!(report.changed);
        assert!(state.highlights.is_empty());

        let again = state.merge(&update(&[], &[], "Docker is installed and running."));
        assert!(!again.changed);
    }

    #[test]
    fn summaryless_update_keeps_highlights() {
        let mut state = PersistedState::default();
        state.merge(&StateUpdate {
            highlights: SummaryHighlights {
                decisions: vec!["Use Postgres".into()],
                ..SummaryHighlights::default()
            },
            ..update(&[], &[], "Chose a database.")
        });
        state.merge(&update(&[("os", "macOS")], &[], ""));
        assert_eq!(state.highlights.decisions, vec!["Use Postgres".to_string()]);
    }

    #[test]
    fn state_json_roundtrip() {
        let mut state = PersistedState::default();
        state.merge(&StateUpdate {
            highlights: SummaryHighlights {
                key_facts: vec!["Uses Docker".into()],
                todos: vec!["Install Docker on Mac".into()],
                ..SummaryHighlights::default()
            },
            ..update(&[("tech_stack_preference", "Python")], &["No Java code"], "Digest.")
        });

        let json = serde_json::to_string_pretty(&state).unwrap();
        let parsed: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn missing_optional_fields_default() {
        let parsed: PersistedState = serde_json::from_str(r#"{"schema_version":1}"#).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.batches, 0);
    }
}
