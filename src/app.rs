//! Service wiring: builds every collaborator from [`Config`] and owns them
//! for the lifetime of the process.
//!
//! The HTTP server and the CLI share one [`Services`] value. A vector index
//! that cannot be constructed (missing credentials, unknown host) does not
//! stop startup: the service runs degraded, answering from general
//! knowledge and rejecting uploads.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use docchat_core::contextualize::QueryContextualizer;
use docchat_core::index::memory::InMemoryIndex;
use docchat_core::index::VectorIndex;
use docchat_core::instructions::InstructionCache;
use docchat_core::llm::LanguageModel;
use docchat_core::retriever::RetrieverAdapter;
use docchat_core::synthesize::AnswerSynthesizer;
use docchat_core::TurnOrchestrator;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::Ingestor;
use crate::llm::create_model;
use crate::pinecone::PineconeIndex;
use crate::prompt_file::JsonPromptFile;
use crate::supabase::SupabaseSource;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub message: String,
    pub index: String,
    pub embedding_dimensions: usize,
}

pub struct Services {
    orchestrator: TurnOrchestrator,
    ingestor: Ingestor,
    index_description: Option<String>,
    embedding_dims: usize,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = create_model(&config.llm)?;
        let (index, dims) = build_index(config)?;
        let cache = build_instruction_cache(config)?;
        info!(
            llm = model.model_name(),
            index = %index.as_ref().map(|i| i.describe()).unwrap_or_else(|| "none".into()),
            "services configured"
        );
        Ok(Self::from_parts(config, model, index, dims, cache))
    }

    /// Assemble services from already-built collaborators.
    pub fn from_parts(
        config: &Config,
        model: Arc<dyn LanguageModel>,
        index: Option<Arc<dyn VectorIndex>>,
        embedding_dims: usize,
        cache: InstructionCache,
    ) -> Self {
        let retriever = match &index {
            Some(index) => RetrieverAdapter::new(index.clone(), config.retrieval.policy()),
            None => RetrieverAdapter::disabled(),
        };
        let ingestor = match &index {
            Some(index) => Ingestor::new(index.clone(), &config.chunking),
            None => Ingestor::disabled(&config.chunking),
        };
        let orchestrator = TurnOrchestrator::new(
            Arc::new(cache),
            QueryContextualizer::new(model.clone(), config.conversation.rewrite_policy()),
            retriever,
            AnswerSynthesizer::new(model, config.conversation.history_window),
        )
        .with_apology(config.conversation.apology.clone());

        Self {
            orchestrator,
            ingestor,
            index_description: index.map(|i| i.describe()),
            embedding_dims,
        }
    }

    pub fn orchestrator(&self) -> &TurnOrchestrator {
        &self.orchestrator
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn instructions(&self) -> &Arc<InstructionCache> {
        self.orchestrator.instructions()
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        self.orchestrator.synthesizer()
    }

    pub fn status(&self) -> ServiceStatus {
        let (status, index) = match &self.index_description {
            Some(desc) => ("online", desc.clone()),
            None => ("degraded (vector index disconnected)", "none".to_string()),
        };
        ServiceStatus {
            status: status.to_string(),
            message: "docchat backend is running".to_string(),
            index,
            embedding_dimensions: self.embedding_dims,
        }
    }
}

fn build_index(config: &Config) -> Result<(Option<Arc<dyn VectorIndex>>, usize)> {
    if !config.index.is_enabled() {
        return Ok((None, 0));
    }
    let embedder = create_embedder(&config.embedding)?;
    let dims = embedder.dims();
    let index: Option<Arc<dyn VectorIndex>> = match config.index.provider.as_str() {
        "memory" => Some(Arc::new(InMemoryIndex::new(embedder))),
        "pinecone" => match PineconeIndex::new(&config.index, embedder) {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                warn!(error = %e, "vector index unavailable, running degraded");
                None
            }
        },
        other => anyhow::bail!("Unknown index provider: {}", other),
    };
    Ok((index, dims))
}

fn build_instruction_cache(config: &Config) -> Result<InstructionCache> {
    let settings = &config.instructions;
    let mut cache = InstructionCache::new(settings.baseline.clone())
        .with_local(Arc::new(JsonPromptFile::new(settings.cache_path.clone())));
    if let Some(remote) = SupabaseSource::from_config(settings)? {
        cache = cache.with_remote(Arc::new(remote));
    }
    Ok(cache)
}
