//! System prompts and prompt builders for each model-backed component.

use sessionloom_core::message::Turn;

use crate::capability::Prompt;
use crate::context::{render_turns, MemoryContext};

pub const GUARDRAIL_SYSTEM: &str = "\
You are a query analyst. Inspect the CURRENT USER QUERY and return a JSON verdict.

1. EXPLICIT SIGNALS
   - A fact the user states about themselves (\"My name is Huy\", \"I am a student\") goes in new_user_facts.
   - A preference or standing constraint (\"Don't use Java\", \"Keep answers short\") goes in new_user_preferences.
   - Only extract what the current query states outright. Otherwise leave both lists empty.

2. AMBIGUITY
   - Pronouns and references (\"it\", \"that\", \"him\") are NOT ambiguous when RECENT CONVERSATION or MEMORY names a likely referent.
   - Flag is_ambiguous only when the query admits several distinct plausible readings and nothing in the history or memory picks one, e.g. a polysemous word with no context (\"I want to open a bank\").
   - When ambiguous, set ambiguity_reason to ambiguous_reference, ambiguous_topic or incomplete_context, and list at least two candidates, each with a short interpretation_label, a clarifying_question and concrete option_values.
   - When not ambiguous, set ambiguity_reason to none and candidates to an empty list.

Return JSON matching the schema and nothing else.";

pub const REWRITER_SYSTEM: &str = "\
You rewrite a user query so it can be understood without the conversation.

- Replace implicit references (\"it\", \"that\", \"this one\", \"him\") with the entity they denote, taken from RECENT CONVERSATION or MEMORY.
- When several mentions qualify, pick the most recent one that fits the reference's grammatical role.
- Respect stated preferences and constraints when naming the entity.
- Never change what the user is asking for. Only make implicit references explicit.
- If nothing needs resolving, return the query unchanged.
- List each substitution in resolved_references.

Return JSON matching the schema and nothing else.";

pub const CONSOLIDATOR_SYSTEM: &str = "\
You maintain a single source of truth about a user across conversations.

Inputs: the CURRENT MEMORY (profile facts, constraints, prior summary), HINTS the user stated this session, and the MESSAGES TO CONSOLIDATE.

1. PROFILE
   - Emit profile_updates only for facts that are new or changed. Use short snake_case keys such as job_title or preferred_language.
   - If the user changed their mind, emit the latest value for the same key.
2. CONSTRAINTS
   - Emit constraint_updates for standing directives the user expects to be followed (\"No Java code\"). Do not repeat existing ones.
3. SUMMARY
   - Write a new summary that folds the prior summary together with the new messages. Earlier facts must survive.
   - Fill key_facts, decisions, open_questions and todos from the conversation. Do not restate profile facts.

Return JSON matching the schema and nothing else.";

pub const GENERATOR_SYSTEM: &str = "\
You are a helpful and knowledgeable assistant.
Answer the user's question clearly and accurately.
Follow every constraint listed below. Return JSON with the answer text in the answer field.";

/// Prompt for the ambiguity guardrail.
pub fn guardrail_prompt(raw_query: &str, recent_turns: &[Turn], memory: MemoryContext<'_>) -> Prompt {
    let user = format!(
        "=== MEMORY ===\n{}\n\n=== RECENT CONVERSATION ===\n{}\n\n=== CURRENT USER QUERY ===\n{}",
        memory.render_json(),
        render_turns(recent_turns),
        raw_query
    );
    Prompt::new(GUARDRAIL_SYSTEM, user)
}

/// Prompt for the query rewriter.
pub fn rewriter_prompt(raw_query: &str, recent_turns: &[Turn], memory: MemoryContext<'_>) -> Prompt {
    let user = format!(
        "=== MEMORY ===\n{}\n\n=== RECENT CONVERSATION ===\n{}\n\n=== QUERY TO REWRITE ===\n{}",
        memory.render_json(),
        render_turns(recent_turns),
        raw_query
    );
    Prompt::new(REWRITER_SYSTEM, user)
}

/// Prompt for the memory consolidator.
pub fn consolidator_prompt(turns: &[Turn], memory: MemoryContext<'_>) -> Prompt {
    let current = serde_json::json!({
        "profile": memory
            .state
            .profile
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect::<std::collections::BTreeMap<_, _>>(),
        "constraints": memory.state.constraints,
        "summary": memory.state.summary,
        "highlights": memory.state.highlights,
    });
    let hints = serde_json::json!({
        "facts": memory.staged.facts,
        "preferences": memory.staged.preferences,
    });
    let user = format!(
        "=== CURRENT MEMORY ===\n{current}\n\n=== HINTS ===\n{hints}\n\n=== MESSAGES TO CONSOLIDATE ===\n{}\n\nTASK: Consolidate the profile and summarize the session.",
        render_turns(turns)
    );
    Prompt::new(CONSOLIDATOR_SYSTEM, user)
}

/// Prompt for answer generation, with memory injected into the system prompt.
pub fn generation_prompt(
    query: &str,
    recent_turns: &[Turn],
    memory: MemoryContext<'_>,
    temperature: f32,
) -> Prompt {
    let blocks = memory.render_blocks();
    let system = if blocks.is_empty() {
        GENERATOR_SYSTEM.to_string()
    } else {
        format!("{GENERATOR_SYSTEM}\n\n{blocks}")
    };
    let user = if recent_turns.is_empty() {
        query.to_string()
    } else {
        format!(
            "=== RECENT CONVERSATION ===\n{}\n\n=== QUESTION ===\n{query}",
            render_turns(recent_turns)
        )
    };
    Prompt::new(system, user).with_temperature(temperature)
}
