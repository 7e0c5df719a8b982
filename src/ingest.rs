//! Document ingestion: extract, chunk, embed, upsert.
//!
//! Extraction and chunking are CPU-bound and run on the blocking pool.
//! A file's earlier vectors are removed before its new records are
//! upserted in batches, so a re-upload that yields fewer chunks leaves no
//! stale ones behind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use docchat_core::chunk::{chunk_document, Chunk};
use docchat_core::index::{IndexRecord, MetadataFilter, VectorIndex};
use docchat_core::{PipelineError, Stage};

use crate::config::ChunkingConfig;
use crate::extract::{extract_text, file_type_label, infer_content_type, ExtractError};

pub const NO_TEXT_MESSAGE: &str = "The file provided contains no extractable text.";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Vector index is not configured; document ingestion is unavailable")]
    IndexDisabled,
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

impl IngestError {
    /// Whether the caller sent something we cannot index.
    pub fn is_client_error(&self) -> bool {
        match self {
            IngestError::Extract(_) => true,
            IngestError::Pipeline(e) => e.is_validation(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub message: String,
    pub filename: String,
    pub file_size: usize,
    pub chunk_count: usize,
    /// Effective content type of the upload.
    pub file_type: String,
    pub ingested_at: DateTime<Utc>,
}

pub struct Ingestor {
    index: Option<Arc<dyn VectorIndex>>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(index: Arc<dyn VectorIndex>, chunking: &ChunkingConfig) -> Self {
        Self {
            index: Some(index),
            ..Self::disabled(chunking)
        }
    }

    /// An ingestor with no index; every ingest and delete is rejected.
    pub fn disabled(chunking: &ChunkingConfig) -> Self {
        Self {
            index: None,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            batch_size: chunking.upsert_batch_size.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    fn index(&self) -> Result<&Arc<dyn VectorIndex>, IngestError> {
        self.index.as_ref().ok_or(IngestError::IndexDisabled)
    }

    pub async fn ingest(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let index = self.index()?;
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(PipelineError::validation("A filename is required.").into());
        }

        let content_type = infer_content_type(filename, content_type);
        let file_size = bytes.len();
        info!(
            file = %filename,
            kind = file_type_label(&content_type),
            bytes = file_size,
            "ingesting document"
        );

        let chunks = self.split(filename, bytes, &content_type).await?;
        if chunks.is_empty() {
            return Err(PipelineError::validation(NO_TEXT_MESSAGE).into());
        }

        let records: Vec<IndexRecord> = chunks.iter().map(Chunk::to_record).collect();
        index
            .delete(&MetadataFilter::source(filename))
            .await
            .map_err(|e| PipelineError::transient(Stage::Ingest, &e))?;
        let batches = records.len().div_ceil(self.batch_size);
        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            index
                .upsert(batch)
                .await
                .map_err(|e| PipelineError::transient(Stage::Ingest, &e))?;
            info!(file = %filename, batch = i + 1, batches, "indexed batch");
        }

        Ok(IngestReport {
            message: format!("Successfully indexed {} ({} chunks)", filename, records.len()),
            filename: filename.to_string(),
            file_size,
            chunk_count: records.len(),
            file_type: content_type,
            ingested_at: Utc::now(),
        })
    }

    /// Ingest a file from disk, inferring its type from the extension.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest(&filename, bytes, None).await
    }

    /// Remove every vector whose `filename` metadata equals `filename`.
    pub async fn delete_document(&self, filename: &str) -> Result<(), IngestError> {
        let index = self.index()?;
        index
            .delete(&MetadataFilter::source(filename))
            .await
            .map_err(|e| PipelineError::transient(Stage::Ingest, &e))?;
        info!(file = %filename, "deleted document vectors");
        Ok(())
    }

    async fn split(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<Chunk>, IngestError> {
        let source = filename.to_string();
        let content_type = content_type.to_string();
        let (size, overlap) = (self.chunk_size, self.chunk_overlap);
        let chunks = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>, ExtractError> {
            let text = extract_text(&bytes, &content_type)?;
            Ok(chunk_document(&source, &text, size, overlap))
        })
        .await??;
        debug!(file = %filename, chunks = chunks.len(), "split document");
        Ok(chunks)
    }
}
