//! Single-call retrieval against the vector index.
//!
//! The [`RetrieverAdapter`] issues one search with the deployment's fixed
//! [`RetrievalPolicy`] and normalizes hits into [`RetrievedChunk`]s. Index
//! errors are reported in the tagged [`Retrieval`] outcome and otherwise
//! behave as "no context found".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PipelineError, Stage};
use crate::index::{SearchHit, SearchMode, VectorIndex, SOURCE_FIELD};
use crate::models::RetrievedChunk;

/// Label used when a hit carries no source metadata.
pub const UNKNOWN_SOURCE: &str = "doc";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalPolicy {
    pub mode: SearchMode,
    pub k: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            mode: SearchMode::Diversity {
                fetch_k: 20,
                lambda: 0.7,
            },
            k: 6,
        }
    }
}

/// Outcome of the retrieval stage.
#[derive(Debug)]
pub enum Retrieval {
    Found(Vec<RetrievedChunk>),
    Empty,
    /// No index is configured.
    Disabled,
    Failed(PipelineError),
}

impl Retrieval {
    pub fn into_chunks(self) -> Vec<RetrievedChunk> {
        match self {
            Retrieval::Found(chunks) => chunks,
            _ => Vec::new(),
        }
    }
}

pub struct RetrieverAdapter {
    index: Option<Arc<dyn VectorIndex>>,
    policy: RetrievalPolicy,
}

impl RetrieverAdapter {
    pub fn new(index: Arc<dyn VectorIndex>, policy: RetrievalPolicy) -> Self {
        Self {
            index: Some(index),
            policy,
        }
    }

    /// An adapter with no index; every lookup is [`Retrieval::Disabled`].
    pub fn disabled() -> Self {
        Self {
            index: None,
            policy: RetrievalPolicy::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    pub fn policy(&self) -> RetrievalPolicy {
        self.policy
    }

    pub async fn fetch(&self, query: &str) -> Retrieval {
        let Some(index) = &self.index else {
            return Retrieval::Disabled;
        };
        match index.search(query, self.policy.mode, self.policy.k).await {
            Ok(hits) if hits.is_empty() => Retrieval::Empty,
            Ok(hits) => {
                debug!(
                    count = hits.len(),
                    mode = self.policy.mode.name(),
                    "retrieved context"
                );
                Retrieval::Found(hits.into_iter().map(to_chunk).collect())
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "retrieval failed, continuing without context");
                Retrieval::Failed(PipelineError::transient(Stage::Retrieval, &e))
            }
        }
    }

    /// Ranked chunks for `query`; empty when nothing was found or the index failed.
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedChunk> {
        self.fetch(query).await.into_chunks()
    }
}

fn to_chunk(hit: SearchHit) -> RetrievedChunk {
    let label = hit
        .metadata_str(SOURCE_FIELD)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string();
    RetrievedChunk {
        text: hit.text,
        source_label: label,
    }
}
