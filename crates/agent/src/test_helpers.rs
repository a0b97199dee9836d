//! Shared test helpers for pipeline tests.

use async_trait::async_trait;
use sessionloom_core::error::{CapabilityError, StorageError};
use sessionloom_core::memory::{PersistedState, StateStore};
use sessionloom_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

type Scripted = Result<String, CapabilityError>;

/// A mock provider that answers by requested schema name.
///
/// Each schema has its own queue of scripted results. When a queue runs dry
/// the schema's fallback (if any) is returned; otherwise the call fails as
/// `Unreachable`, which exercises the degrade paths.
#[derive(Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallbacks: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON payload for the next request with this schema.
    pub fn respond(self, schema: &str, json: &str) -> Self {
        self.push(schema, Ok(json.to_string()));
        self
    }

    /// Queue a failure for the next request with this schema.
    pub fn fail(self, schema: &str, error: CapabilityError) -> Self {
        self.push(schema, Err(error));
        self
    }

    /// Payload returned whenever this schema's queue is empty.
    pub fn fallback(self, schema: &str, json: &str) -> Self {
        self.fallbacks
            .lock()
            .unwrap()
            .insert(schema.to_string(), json.to_string());
        self
    }

    pub fn push(&self, schema: &str, result: Scripted) {
        self.queues
            .lock()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests sent with the given schema, oldest first.
    pub fn requests_for(&self, schema: &str) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.output_schema.name == schema)
            .collect()
    }

    pub fn call_count(&self, schema: &str) -> usize {
        self.requests_for(schema).len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, CapabilityError> {
        let schema = request.output_schema.name.clone();
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&schema)
            .and_then(|q| q.pop_front());

        let content = match next {
            Some(result) => result?,
            None => self
                .fallbacks
                .lock()
                .unwrap()
                .get(&schema)
                .cloned()
                .ok_or_else(|| CapabilityError::Unreachable(format!("nothing scripted for {schema}")))?,
        };

        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

/// A store whose saves always fail; loads return the seeded state.
pub struct FailingStore {
    state: PersistedState,
}

impl FailingStore {
    pub fn new(state: PersistedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl StateStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn load(&self) -> Result<PersistedState, StorageError> {
        Ok(self.state.clone())
    }

    async fn save(&self, _state: &PersistedState) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: PathBuf::from("/dev/full"),
            reason: "disk full".into(),
        })
    }
}

/// A clear guardrail verdict with no extracted signals.
pub fn clear_verdict() -> &'static str {
    r#"{"is_ambiguous": false, "ambiguity_reason": "none", "candidates": [], "new_user_facts": [], "new_user_preferences": []}"#
}

/// The classic "open a bank" verdict with two interpretations.
pub fn bank_verdict() -> &'static str {
    r#"{
        "is_ambiguous": true,
        "ambiguity_reason": "ambiguous_topic",
        "candidates": [
            {
                "interpretation_label": "Financial institution",
                "clarifying_question": "Do you want to open an account at a bank?",
                "option_values": ["Open a savings account", "Open a checking account"]
            },
            {
                "interpretation_label": "River bank",
                "clarifying_question": "Do you mean the bank of a river?",
                "option_values": ["Reinforce a river embankment"]
            }
        ],
        "new_user_facts": [],
        "new_user_preferences": []
    }"#
}

pub fn answer(text: &str) -> String {
    serde_json::json!({ "answer": text }).to_string()
}

pub fn rewrite(text: &str) -> String {
    serde_json::json!({ "rewritten_query": text, "resolved_references": [] }).to_string()
}
