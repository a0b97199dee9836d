//! Memory context handed to the model-backed components.
//!
//! Combines the durable `PersistedState` with signals staged during the
//! current session (facts and preferences the user stated outright that have
//! not been consolidated yet), and renders them for prompts.

use serde::Serialize;
use sessionloom_core::memory::PersistedState;
use sessionloom_core::message::{Message, Turn};
use std::collections::BTreeMap;

/// Explicit facts and preferences extracted from user inputs this session.
///
/// Staged in memory only; the consolidator receives them as hints and they
/// are cleared once a consolidation is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagedSignals {
    pub facts: Vec<String>,
    pub preferences: Vec<String>,
}

impl StagedSignals {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.preferences.is_empty()
    }

    /// Add new signals, skipping blanks and exact duplicates.
    pub fn absorb(&mut self, facts: &[String], preferences: &[String]) -> usize {
        let before = self.facts.len() + self.preferences.len();
        extend_unique(&mut self.facts, facts);
        extend_unique(&mut self.preferences, preferences);
        self.facts.len() + self.preferences.len() - before
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.preferences.clear();
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !target.iter().any(|t| t == item) {
            target.push(item.to_string());
        }
    }
}

/// Read-only view of everything the pipeline remembers about the user.
#[derive(Debug, Clone, Copy)]
pub struct MemoryContext<'a> {
    pub state: &'a PersistedState,
    pub staged: &'a StagedSignals,
}

#[derive(Serialize)]
struct RenderedMemory<'a> {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    profile: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    constraints: Vec<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    summary: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    key_facts: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stated_this_session: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    preferences_this_session: &'a [String],
}

impl<'a> MemoryContext<'a> {
    pub fn new(state: &'a PersistedState, staged: &'a StagedSignals) -> Self {
        Self { state, staged }
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty() && self.staged.is_empty()
    }

    /// Compact JSON for analysis prompts; `None` when nothing is known.
    pub fn render_json(&self) -> String {
        if self.is_empty() {
            return "None".into();
        }
        let rendered = RenderedMemory {
            profile: self
                .state
                .profile
                .iter()
                .map(|(k, f)| (k.as_str(), f.value.as_str()))
                .collect(),
            constraints: self.state.constraints.iter().map(String::as_str).collect(),
            summary: &self.state.summary,
            key_facts: &self.state.highlights.key_facts,
            stated_this_session: &self.staged.facts,
            preferences_this_session: &self.staged.preferences,
        };
        serde_json::to_string(&rendered).unwrap_or_else(|_| "None".into())
    }

    /// Context blocks appended to the generation system prompt.
    ///
    /// Empty blocks are omitted; with no memory at all this is empty.
    pub fn render_blocks(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();

        let profile: Vec<String> = self
            .state
            .profile
            .iter()
            .map(|(k, f)| format!("{k}: {}", f.value))
            .chain(self.staged.facts.iter().cloned())
            .collect();
        push_block(&mut blocks, "USER PROFILE", &profile);

        let constraints: Vec<String> = self.state.constraints.iter().cloned().collect();
        push_block(&mut blocks, "CONSTRAINTS (Must Follow)", &constraints);
        push_block(&mut blocks, "PREFERENCES", &self.staged.preferences);

        if !self.state.summary.is_empty() {
            blocks.push(format!("=== SESSION SUMMARY ===\n{}", self.state.summary));
        }
        push_block(&mut blocks, "KEY FACTS", &self.state.highlights.key_facts);

        blocks.join("\n\n")
    }
}

fn push_block(blocks: &mut Vec<String>, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let body: Vec<String> = lines.iter().map(|l| format!("- {l}")).collect();
    blocks.push(format!("=== {title} ===\n{}", body.join("\n")));
}

/// Render turns as a JSON array of `{role, content}` messages.
pub fn render_turns(turns: &[Turn]) -> String {
    let messages: Vec<Message> = turns.iter().map(Turn::to_message).collect();
    serde_json::to_string(&messages).unwrap_or_else(|_| "[]".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionloom_core::memory::{FactUpdate, StateUpdate};
    use sessionloom_core::message::Role;

    fn remembered() -> PersistedState {
        let mut state = PersistedState::default();
        state.merge(&StateUpdate {
            profile_updates: vec![FactUpdate {
                key: "preferred_language".into(),
                value: "Python".into(),
            }],
            constraint_updates: vec!["No Java code".into()],
            summary: "User is learning backend development.".into(),
            consumed_turns: 2,
            ..StateUpdate::default()
        });
        state
    }

    #[test]
    fn absorb_deduplicates_and_skips_blanks() {
        let mut staged = StagedSignals::default();
        let added = staged.absorb(
            &["User name is Huy".into(), "  ".into()],
            &["Prefers concise answers".into()],
        );
        assert_eq!(added, 2);
        let added = staged.absorb(&["User name is Huy".into()], &[]);
        assert_eq!(added, 0);
        assert_eq!(staged.facts, vec!["User name is Huy".to_string()]);
    }

    #[test]
    fn empty_memory_renders_none() {
        let state = PersistedState::default();
        let staged = StagedSignals::default();
        let ctx = MemoryContext::new(&state, &staged);
        assert!(ctx.is_empty());
        assert_eq!(ctx.render_json(), "None");
        assert_eq!(ctx.render_blocks(), "");
    }

    #[test]
    fn json_includes_profile_constraints_and_staged() {
        let state = remembered();
        let mut staged = StagedSignals::default();
        staged.absorb(&["Works at a startup".into()], &[]);
        let json = MemoryContext::new(&state, &staged).render_json();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["profile"]["preferred_language"], "Python");
        assert_eq!(value["constraints"][0], "No Java code");
        assert_eq!(value["stated_this_session"][0], "Works at a startup");
        assert!(value.get("preferences_this_session").is_none());
    }

    #[test]
    fn blocks_omit_empty_sections() {
        let state = remembered();
        let staged = StagedSignals::default();
        let blocks = MemoryContext::new(&state, &staged).render_blocks();

        assert!(blocks.contains("=== USER PROFILE ===\n- preferred_language: Python"));
        assert!(blocks.contains("=== CONSTRAINTS (Must Follow) ===\n- No Java code"));
        assert!(blocks.contains("=== SESSION SUMMARY ===\nUser is learning backend development."));
        assert!(!blocks.contains("PREFERENCES"));
        assert!(!blocks.contains("KEY FACTS"));
    }

    #[test]
    fn turns_render_as_messages() {
        let turns = vec![
            Turn::new(0, Role::User, "hi", 5),
            Turn::new(1, Role::Assistant, "hello", 6),
        ];
        let json = render_turns(&turns);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["role"], "user");
        assert_eq!(value[1]["content"], "hello");
        assert_eq!(render_turns(&[]), "[]");
    }
}
