//! Message and Turn domain types.
//!
//! A `Turn` is what the session buffer records for every user or assistant
//! message. A `Message` is the wire-level value sent to the model capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session (one process run of the pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (never recorded as a Turn)
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// A single message sent to the model capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One recorded conversational turn.
///
/// Immutable once created: fields are only readable. `index` is the absolute
/// position of the turn in the session, independent of buffer truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    index: u64,
    role: Role,
    text: String,
    timestamp: DateTime<Utc>,
    token_count: usize,
}

impl Turn {
    pub fn new(index: u64, role: Role, text: impl Into<String>, token_count: usize) -> Self {
        Self {
            index,
            role,
            text: text.into(),
            timestamp: Utc::now(),
            token_count,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// The wire message for this turn.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.text.clone(),
        }
    }
}
