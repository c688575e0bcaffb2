//! Core data model for the chat pipeline: conversation messages, query
//! results, and validation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One turn fragment in a conversation thread. Threads are append-only;
/// a message is never edited or reordered after it is recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Caller-supplied response id, recorded on the assistant message that
    /// closes a turn so a later turn can reference it.
    pub response_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), response_id: None, created_at: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>, response_id: Option<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), response_id, created_at: Utc::now() }
    }
}

/// Result of one validated, executed read-only query. Immutable once built;
/// the executor only constructs this from SQL that passed validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResult {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
}

/// Classification of a candidate SQL statement. Never partially valid:
/// either the statement is executable-safe or it carries a rejection reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self { valid: true, error: None }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { valid: false, error: Some(reason.into()) }
    }
}
