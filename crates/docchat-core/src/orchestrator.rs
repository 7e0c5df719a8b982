//! One conversation turn, end to end.
//!
//! ```text
//! START ─▶ CONTEXTUALIZE ─▶ RETRIEVE ─▶ SYNTHESIZE ─▶ DONE
//!                                           │
//!                                           ▼ failure
//!                                     ERROR_FALLBACK
//!                             direct answer ─▶ apology
//! ```
//!
//! Rewrite and retrieval degrade to safe defaults. Synthesis failure gets one
//! direct model call with the raw message; if that fails as well the turn
//! ends with the configured apology. A turn always returns a [`TurnResult`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::contextualize::{QueryContextualizer, Rewrite};
use crate::error::PipelineError;
use crate::instructions::InstructionCache;
use crate::models::{ConversationTurn, RetrievedChunk, TurnResult};
use crate::retriever::{Retrieval, RetrieverAdapter};
use crate::synthesize::{AnswerSynthesizer, SynthesisMode};

pub const DEFAULT_APOLOGY: &str =
    "I'm sorry, I couldn't generate a response right now. Please try again in a moment.";

/// Where the fallback ladder ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Synthesis answered.
    Done,
    /// Synthesis failed and the direct call answered.
    DirectFallback,
    /// Both failed; the apology was returned.
    Apology,
}

pub struct TurnOrchestrator {
    instructions: Arc<InstructionCache>,
    contextualizer: QueryContextualizer,
    retriever: RetrieverAdapter,
    synthesizer: AnswerSynthesizer,
    apology: String,
}

impl TurnOrchestrator {
    pub fn new(
        instructions: Arc<InstructionCache>,
        contextualizer: QueryContextualizer,
        retriever: RetrieverAdapter,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            instructions,
            contextualizer,
            retriever,
            synthesizer,
            apology: DEFAULT_APOLOGY.to_string(),
        }
    }

    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        let apology = apology.into();
        if !apology.trim().is_empty() {
            self.apology = apology;
        }
        self
    }

    pub fn instructions(&self) -> &Arc<InstructionCache> {
        &self.instructions
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    pub fn retriever(&self) -> &RetrieverAdapter {
        &self.retriever
    }

    pub fn apology(&self) -> &str {
        &self.apology
    }

    pub async fn run_turn(&self, message: &str, history: &[ConversationTurn]) -> TurnResult {
        self.run_turn_traced(message, history).await.0
    }

    /// Run a turn and also report where the fallback ladder ended.
    pub async fn run_turn_traced(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> (TurnResult, TurnState) {
        let mut errors: Vec<String> = Vec::new();

        let instructions = self.instructions.get(false).await;

        let rewrite = self.contextualizer.rewrite(message, history).await;
        if let Rewrite::Fallback { error, .. } = &rewrite {
            errors.push(error.to_string());
        }
        let query = rewrite.into_query();

        let chunks: Vec<RetrievedChunk> = match self.retriever.fetch(&query).await {
            Retrieval::Found(chunks) => chunks,
            Retrieval::Empty | Retrieval::Disabled => Vec::new(),
            Retrieval::Failed(error) => {
                errors.push(error.to_string());
                Vec::new()
            }
        };
        let used_context = !chunks.is_empty();

        // General mode answers the user's own words; grounded mode answers
        // the standalone query the context was retrieved for.
        let question = match SynthesisMode::for_chunks(&chunks) {
            SynthesisMode::Grounded => query.as_str(),
            SynthesisMode::General => message,
        };

        let synthesis = self
            .synthesizer
            .synthesize(&instructions, history, &chunks, question)
            .await;

        let (answer_text, state) = match synthesis {
            Ok(answer) => (answer, TurnState::Done),
            Err(synth_err) => {
                warn!(error = %synth_err, "synthesis failed, trying a direct answer");
                errors.push(synth_err.to_string());
                match self.synthesizer.answer_directly(message).await {
                    Ok(answer) => (answer, TurnState::DirectFallback),
                    Err(direct_err) => {
                        let total = PipelineError::TotalSynthesisFailure(direct_err.to_string());
                        warn!(error = %total, "direct answer failed, returning apology");
                        errors.push(total.to_string());
                        (self.apology.clone(), TurnState::Apology)
                    }
                }
            }
        };

        info!(
            used_context,
            chunks = chunks.len(),
            outcome = ?state,
            degraded = errors.len(),
            "turn complete"
        );

        let result = TurnResult {
            answer_text,
            used_context,
            errors: if errors.is_empty() { None } else { Some(errors) },
        };
        (result, state)
    }
}
