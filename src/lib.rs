//! # docchat
//!
//! Conversational question answering over an organization's own documents.
//!
//! Each chat turn rewrites a follow-up into a standalone query, retrieves
//! diverse reference chunks from a vector index, and synthesizes an answer
//! that cites them, degrading to general knowledge and finally to a fixed
//! apology when collaborators fail. The turn pipeline itself lives in
//! [`docchat_core`]; this crate supplies the real collaborators and the
//! outer surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌───────────────┐
//! │  Uploads   │──▶│  Ingestor  │──▶│ Vector index  │
//! │ PDF/OOXML  │   │ chunk+embed│   │ Pinecone/mem  │
//! └────────────┘   └────────────┘   └──────┬────────┘
//!                                          │
//!  ┌──────────┐    ┌────────────────┐      │
//!  │ Supabase │──▶ │ TurnOrchestrator│◀─────┘
//!  │ + JSON   │    │  (docchat-core) │──▶ OpenAI / Ollama
//!  └──────────┘    └───────┬────────┘
//!                          │
//!                ┌─────────┴────────┐
//!                ▼                  ▼
//!           ┌──────────┐      ┌──────────┐
//!           │   CLI    │      │   HTTP   │
//!           └──────────┘      └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`app`] | Builds and owns every collaborator |
//! | [`llm`] | OpenAI and Ollama chat providers |
//! | [`embedding`] | OpenAI, Ollama, and local embedding providers |
//! | [`pinecone`] | Pinecone vector index |
//! | [`supabase`] | Remote system instruction source |
//! | [`prompt_file`] | Local JSON copy of the system instructions |
//! | [`extract`] | PDF / OOXML / text extraction |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`server`] | axum HTTP API |
//! | [`http`] | Shared HTTP client and retry policy |

pub mod app;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod pinecone;
pub mod prompt_file;
pub mod server;
pub mod supabase;
