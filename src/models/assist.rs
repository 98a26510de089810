use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body posted to the assistant endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistRequest {
    pub query: AssistQuery,
    pub session: AssistSession,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistQuery {
    /// Lexicographically sortable unique id
    pub id: String,

    /// User prompt; empty for a bootstrap request
    pub prompt: String,
}

/// Identity of one chat client, stable across its requests
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistSession {
    pub processor_id: String,
    pub activity_id: String,
    pub request_id: String,

    #[serde(default)]
    pub interactions: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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
}
