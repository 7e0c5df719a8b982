//! Final answer generation.
//!
//! The [`AnswerSynthesizer`] picks grounded or general-knowledge mode from
//! the retrieved chunks, builds the [`PromptContext`], and makes exactly one
//! model call. Unlike the earlier stages it does not absorb failures: a
//! failed or empty answer is returned as an error for the orchestrator to
//! handle.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PipelineError, Result, Stage};
use crate::llm::LanguageModel;
use crate::models::{ConversationTurn, PromptContext, RetrievedChunk};
use crate::prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    Grounded,
    General,
}

impl SynthesisMode {
    pub fn for_chunks(chunks: &[RetrievedChunk]) -> Self {
        if chunks.is_empty() {
            SynthesisMode::General
        } else {
            SynthesisMode::Grounded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisMode::Grounded => "grounded",
            SynthesisMode::General => "general",
        }
    }
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    history_window: usize,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, history_window: usize) -> Self {
        Self {
            model,
            history_window,
        }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Assemble the prompt inputs for one turn.
    pub fn build_context(
        &self,
        instructions: &str,
        history: &[ConversationTurn],
        chunks: &[RetrievedChunk],
        question: &str,
    ) -> PromptContext {
        PromptContext {
            system_instructions: instructions.to_string(),
            history_text: prompt::transcript(history, self.history_window),
            context_text: prompt::context_text(chunks),
            question: question.to_string(),
        }
    }

    pub fn build_prompt(
        &self,
        instructions: &str,
        history: &[ConversationTurn],
        chunks: &[RetrievedChunk],
        question: &str,
    ) -> (SynthesisMode, String) {
        let mode = SynthesisMode::for_chunks(chunks);
        let ctx = self.build_context(instructions, history, chunks, question);
        let text = match mode {
            SynthesisMode::Grounded => prompt::grounded_prompt(&ctx),
            SynthesisMode::General => prompt::general_prompt(&ctx),
        };
        (mode, text)
    }

    /// Generate the answer. Mode is grounded iff `chunks` is non-empty.
    pub async fn synthesize(
        &self,
        instructions: &str,
        history: &[ConversationTurn],
        chunks: &[RetrievedChunk],
        question: &str,
    ) -> Result<String> {
        let (mode, text) = self.build_prompt(instructions, history, chunks, question);
        debug!(mode = mode.as_str(), chunks = chunks.len(), "synthesizing answer");
        let answer = self
            .model
            .complete(&text)
            .await
            .map_err(|e| PipelineError::transient(Stage::Synthesis, &e))?;
        non_empty(answer, Stage::Synthesis)
    }

    /// One context-free, history-free call with the raw user message.
    pub async fn answer_directly(&self, message: &str) -> Result<String> {
        let answer = self
            .model
            .complete(message)
            .await
            .map_err(|e| PipelineError::transient(Stage::DirectAnswer, &e))?;
        non_empty(answer, Stage::DirectAnswer)
    }

    /// Short chat title for the first message of a conversation.
    pub async fn generate_title(&self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(PipelineError::validation("Message cannot be empty"));
        }
        let raw = self
            .model
            .complete(&prompt::title_prompt(message))
            .await
            .map_err(|e| PipelineError::transient(Stage::Title, &e))?;
        Ok(clean_title(&raw))
    }
}

fn non_empty(answer: String, stage: Stage) -> Result<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Transient {
            stage,
            message: "model returned an empty answer".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Trim whitespace, then wrapping double quotes, then single quotes.
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}
