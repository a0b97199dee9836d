//! Replay of recorded conversations through the live state machine.
//!
//! A replay log is a JSON array of `{role, text}` records (`content` is
//! accepted as an alias for `text`). User records are fed to the
//! orchestrator in order. An assistant record that directly follows a user
//! record is used as that turn's answer instead of calling generation.

use serde::{Deserialize, Serialize};
use sessionloom_core::error::{Error, Result};
use sessionloom_core::message::Role;
use std::path::Path;
use tracing::{info, warn};

use crate::orchestrator::{Orchestrator, TurnOutcome};

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub role: Role,
    #[serde(alias = "content")]
    pub text: String,
}

impl ReplayRecord {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// What the pipeline did with one user record.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    /// Position of the user record in the log.
    pub record: usize,
    pub input: String,
    pub outcome: TurnOutcome,
}

pub fn parse_replay_log(json: &str) -> Result<Vec<ReplayRecord>> {
    Ok(serde_json::from_str(json)?)
}

pub async fn load_replay_log(path: &Path) -> Result<Vec<ReplayRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_replay_log(&content)
}

/// Feed `records` through `orchestrator` as if they arrived live.
pub async fn replay(
    orchestrator: &mut Orchestrator,
    records: &[ReplayRecord],
) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    let mut i = 0;

    while i < records.len() {
        let record = &records[i];
        match record.role {
            Role::User => {
                let recorded = records
                    .get(i + 1)
                    .filter(|next| next.role == Role::Assistant)
                    .map(|next| next.text.as_str());

                let outcome = match orchestrator.handle_recorded_turn(&record.text, recorded).await {
                    Ok(outcome) => outcome,
                    Err(Error::InvalidInput(reason)) => {
                        warn!(record = i, %reason, "Skipping unusable user record");
                        i += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if outcome.is_clarification() && recorded.is_some() {
                    info!(record = i + 1, "Recorded answer ignored, turn asked for clarification");
                }
                steps.push(ReplayStep {
                    record: i,
                    input: record.text.clone(),
                    outcome,
                });
                i += if recorded.is_some() { 2 } else { 1 };
            }
            Role::Assistant | Role::System => {
                warn!(record = i, role = %record.role, "Skipping record without a preceding user turn");
                i += 1;
            }
        }
    }

    info!(records = records.len(), turns = steps.len(), "Replay finished");
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PipelineSettings;
    use crate::test_helpers::{bank_verdict, clear_verdict, ScriptedProvider};
    use sessionloom_core::event::EventBus;
    use sessionloom_memory::InMemoryStore;
    use std::sync::Arc;

    async fn orchestrator(provider: Arc<ScriptedProvider>) -> Orchestrator {
        Orchestrator::start(
            provider,
            Arc::new(InMemoryStore::new()),
            PipelineSettings::default(),
            Arc::new(EventBus::default()),
        )
        .await
        .unwrap()
    }

    #[test]
    fn parses_text_and_content_fields() {
        let records = parse_replay_log(
            r#"[{"role": "user", "text": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();
        assert_eq!(records, vec![ReplayRecord::user("hi"), ReplayRecord::assistant("hello")]);
    }

    #[test]
    fn rejects_unknown_roles() {
        let err = parse_replay_log(r#"[{"role": "robot", "text": "beep"}]"#).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, r#"[{"role": "user", "text": "hi"}]"#).unwrap();
        assert_eq!(load_replay_log(&path).await.unwrap().len(), 1);
        assert!(matches!(
            load_replay_log(&dir.path().join("missing.json")).await,
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn recorded_answers_are_used() {
        let provider = Arc::new(ScriptedProvider::new().fallback("guardrail_verdict", clear_verdict()));
        let mut orch = orchestrator(provider.clone()).await;
        let records = vec![
            ReplayRecord::user("What is Rust?"),
            ReplayRecord::assistant("A systems language."),
        ];

        let steps = replay(&mut orch, &records).await.unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].outcome.text(), "A systems language.");
        assert_eq!(provider.call_count("generated_answer"), 0);
        assert_eq!(orch.buffer().len(), 2);
    }

    #[tokio::test]
    async fn orphan_assistant_and_blank_records_are_skipped() {
        let provider = Arc::new(ScriptedProvider::new().fallback("guardrail_verdict", clear_verdict()));
        let mut orch = orchestrator(provider).await;
        let records = vec![
            ReplayRecord::assistant("Welcome!"),
            ReplayRecord::user("  "),
            ReplayRecord::user("Hi"),
            ReplayRecord::assistant("Hello."),
        ];

        let steps = replay(&mut orch, &records).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].record, 2);
        assert_eq!(orch.buffer().len(), 2);
    }

    #[tokio::test]
    async fn clarification_ignores_recorded_answer() {
        let provider = Arc::new(ScriptedProvider::new().respond("guardrail_verdict", bank_verdict()));
        let mut orch = orchestrator(provider).await;
        let records = vec![
            ReplayRecord::user("I want to open a bank"),
            ReplayRecord::assistant("Sure, which bank?"),
            ReplayRecord::user("2"),
            ReplayRecord::assistant("Use riprap to stop erosion."),
        ];

        let steps = replay(&mut orch, &records).await.unwrap();

        assert_eq!(steps.len(), 2);
        assert!(steps[0].outcome.is_clarification());
        assert_ne!(steps[0].outcome.text(), "Sure, which bank?");
        assert_eq!(steps[1].outcome.text(), "Use riprap to stop erosion.");
        assert_eq!(orch.buffer().turns()[1].text(), steps[0].outcome.text());
    }
}
