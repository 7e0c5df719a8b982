//! Data types that flow through a single conversation turn.
//!
//! Everything here is request-scoped: the caller supplies the history fresh
//! on every turn and nothing is retained once the [`TurnResult`] is returned.

use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role name from an untrusted client. Anything that is not a
    /// known assistant alias is treated as the user.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "assistant" | "ai" | "bot" | "model" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// One message of the chat history, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A ranked piece of reference text with the label of the document it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_label: String,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_label: source_label.into(),
        }
    }
}

/// The inputs of the final synthesis prompt, assembled fresh for every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub system_instructions: String,
    /// Flat `role: content` transcript of the recent history (may be empty).
    pub history_text: String,
    /// `[Source: label]: text` blocks in rank order (empty in general mode).
    pub context_text: String,
    pub question: String,
}

/// Outcome of one turn. A turn always produces an answer; degradations along
/// the way are listed in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnResult {
    pub answer_text: String,
    pub used_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl TurnResult {
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}
