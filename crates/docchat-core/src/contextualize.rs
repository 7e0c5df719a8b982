//! Follow-up question rewriting.
//!
//! A follow-up such as "what about them?" retrieves nothing useful on its
//! own. When there is history and the message is long enough to be a real
//! question, the [`QueryContextualizer`] asks the model for a standalone
//! rephrasing. Short messages (greetings, "thanks") are passed through
//! unchanged.
//!
//! The result is a tagged [`Rewrite`]; every variant carries a usable query,
//! so this stage never fails the turn.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PipelineError, Stage};
use crate::llm::LanguageModel;
use crate::models::ConversationTurn;
use crate::prompt;

/// When and how much history to use for rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewritePolicy {
    /// Messages with fewer words than this are never rewritten.
    pub greeting_word_threshold: usize,
    /// Number of most recent turns included in the rewrite prompt.
    pub window: usize,
}

impl Default for RewritePolicy {
    fn default() -> Self {
        Self {
            greeting_word_threshold: 4,
            window: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoHistory,
    ShortMessage,
}

/// Outcome of the rewrite stage.
#[derive(Debug)]
pub enum Rewrite {
    Skipped { query: String, reason: SkipReason },
    Rewritten { query: String },
    /// The model call failed or returned nothing; the original message is used.
    Fallback { query: String, error: PipelineError },
}

impl Rewrite {
    pub fn query(&self) -> &str {
        match self {
            Rewrite::Skipped { query, .. }
            | Rewrite::Rewritten { query }
            | Rewrite::Fallback { query, .. } => query,
        }
    }

    pub fn into_query(self) -> String {
        match self {
            Rewrite::Skipped { query, .. }
            | Rewrite::Rewritten { query }
            | Rewrite::Fallback { query, .. } => query,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Rewrite::Fallback { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub struct QueryContextualizer {
    model: Arc<dyn LanguageModel>,
    policy: RewritePolicy,
}

impl QueryContextualizer {
    pub fn new(model: Arc<dyn LanguageModel>, policy: RewritePolicy) -> Self {
        Self { model, policy }
    }

    pub fn policy(&self) -> RewritePolicy {
        self.policy
    }

    /// Decide whether to rewrite `message`, and do it.
    pub async fn rewrite(&self, message: &str, history: &[ConversationTurn]) -> Rewrite {
        if history.is_empty() {
            return Rewrite::Skipped {
                query: message.to_string(),
                reason: SkipReason::NoHistory,
            };
        }
        if word_count(message) < self.policy.greeting_word_threshold {
            return Rewrite::Skipped {
                query: message.to_string(),
                reason: SkipReason::ShortMessage,
            };
        }

        let history_text = prompt::transcript(history, self.policy.window);
        let request = prompt::rewrite_prompt(&history_text, message);
        match self.model.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => {
                let query = text.trim().to_string();
                debug!(rewritten = %query, "rewrote follow-up question");
                Rewrite::Rewritten { query }
            }
            Ok(_) => {
                warn!("rewrite returned an empty question, using the original message");
                Rewrite::Fallback {
                    query: message.to_string(),
                    error: PipelineError::Transient {
                        stage: Stage::Rewrite,
                        message: "model returned an empty rewrite".to_string(),
                    },
                }
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "rewrite failed, using the original message");
                Rewrite::Fallback {
                    query: message.to_string(),
                    error: PipelineError::transient(Stage::Rewrite, &e),
                }
            }
        }
    }

    /// The standalone query to retrieve with.
    pub async fn contextualize(&self, message: &str, history: &[ConversationTurn]) -> String {
        self.rewrite(message, history).await.into_query()
    }
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
