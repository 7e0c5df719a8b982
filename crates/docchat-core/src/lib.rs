//! # docchat core
//!
//! Runtime-agnostic logic for docchat: the conversational RAG turn pipeline,
//! the system instruction cache, text chunking, diversity-aware selection,
//! and the collaborator traits the application crate implements.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Every
//! external system (language model, embedder, vector index, remote and local
//! instruction storage) is reached through a trait, so the whole pipeline can
//! be driven by in-process fakes.
//!
//! ## Turn flow
//!
//! ```text
//! message + history
//!        │
//!        ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Instruction  │──▶│ Contextual-  │──▶│  Retriever   │──▶│ Synthesizer  │
//! │    Cache     │   │    izer      │   │   Adapter    │   │              │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │ failure
//!                                                                 ▼
//!                                                    direct answer ─▶ apology
//! ```

pub mod chunk;
pub mod contextualize;
pub mod embedding;
pub mod error;
pub mod index;
pub mod instructions;
pub mod llm;
pub mod mmr;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod synthesize;

pub use error::{PipelineError, Result, Stage};
pub use models::{ConversationTurn, RetrievedChunk, Role, TurnResult};
pub use orchestrator::TurnOrchestrator;
