//! Generative language model abstraction.
//!
//! Concrete providers (OpenAI, Ollama) live in the `docchat` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// A text-in, text-out completion model.
///
/// Implementations may fail on quota, timeout, or network errors; the
/// pipeline decides how each failure degrades the turn.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;

    /// Complete a single prompt and return the raw generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
