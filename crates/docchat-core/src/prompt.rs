//! Prompt templates.
//!
//! Every prompt sent to the language model is built here, so the wording of
//! the rewrite, grounded, general-knowledge and title prompts lives in one
//! place. All builders are pure string functions.

use crate::models::{ConversationTurn, PromptContext, RetrievedChunk};

const GROUNDED_DIRECTIVES: &str = "\
Core Instructions:
- You are a helpful, professional AI assistant.
- If the user provides a greeting (like 'Hello', 'Hi', 'Hey'), respond warmly and politely.
- For factual questions, prioritize the provided context and cite the source file name when you use it.
- If the answer is not in the context, say that you don't know based on the provided documents, but remain helpful. Do not invent facts beyond the given material.
- Keep the answer concise and professional.";

const GENERAL_DIRECTIVES: &str = "\
Instructions:
- Answer the question based on your general knowledge and the conversation so far.
- If the user provides a greeting (like 'Hello', 'Hi', 'Hey'), respond warmly and politely.
- If you don't know, admit it rather than guessing.";

/// Flatten the last `window` turns into a `role: content` transcript.
pub fn transcript(history: &[ConversationTurn], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render chunks as `[Source: label]: text` blocks separated by blank lines,
/// in the order given.
pub fn context_text(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[Source: {}]: {}", c.source_label, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask for a standalone rephrasing of a follow-up question.
pub fn rewrite_prompt(history_text: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow-up question, rephrase the follow-up \
         question to be a standalone question. Keep every name, entity and fact from the \
         conversation that the follow-up refers to.\n\n\
         Chat History:\n{history_text}\n\n\
         Follow Up Input: {question}\n\n\
         Standalone Question:"
    )
}

/// Prompt that answers from retrieved context.
pub fn grounded_prompt(ctx: &PromptContext) -> String {
    let mut prompt = format!("{}\n\n{}\n\n", ctx.system_instructions, GROUNDED_DIRECTIVES);
    push_history(&mut prompt, &ctx.history_text);
    prompt.push_str(&format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        ctx.context_text, ctx.question
    ));
    prompt
}

/// Prompt that answers from the model's own knowledge.
pub fn general_prompt(ctx: &PromptContext) -> String {
    let mut prompt = format!("{}\n\n{}\n\n", ctx.system_instructions, GENERAL_DIRECTIVES);
    push_history(&mut prompt, &ctx.history_text);
    prompt.push_str(&format!("Question: {}\n\nAnswer:", ctx.question));
    prompt
}

pub fn title_prompt(message: &str) -> String {
    format!(
        "Generate a concise, 3-5 word title for a chat that starts with this message: {}",
        message
    )
}

fn push_history(prompt: &mut String, history_text: &str) {
    if !history_text.trim().is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(history_text);
        prompt.push_str("\n\n");
    }
}
