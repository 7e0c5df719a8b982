//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the boundary between the pipeline and the
//! embedding + vector storage service. Implementations own the embedding of
//! query text, so callers only deal in strings and metadata.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by id |
//! | [`search`](VectorIndex::search) | Ranked retrieval in a [`SearchMode`] |
//! | [`delete`](VectorIndex::delete) | Remove every record matching a [`MetadataFilter`] |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata field carrying the source label (the uploaded file name).
pub const SOURCE_FIELD: &str = "filename";

/// Retrieval strategy, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SearchMode {
    /// Plain top-`k` by similarity.
    Similarity,
    /// Maximal marginal relevance over the top `fetch_k` candidates.
    Diversity { fetch_k: usize, lambda: f32 },
}

impl SearchMode {
    pub fn name(&self) -> &'static str {
        match self {
            SearchMode::Similarity => "similarity",
            SearchMode::Diversity { .. } => "mmr",
        }
    }

    /// Number of candidates to pull from the backend before selection.
    pub fn candidate_count(&self, k: usize) -> usize {
        match self {
            SearchMode::Similarity => k,
            SearchMode::Diversity { fetch_k, .. } => (*fetch_k).max(k),
        }
    }
}

/// A record to store: chunk text plus free-form metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl SearchHit {
    /// Read a string metadata field.
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(|v| v.as_str())
    }
}

/// Equality filter on a single metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Match every record that came from the given source file.
    pub fn source(filename: impl Into<String>) -> Self {
        Self::new(SOURCE_FIELD, filename)
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        metadata
            .get(&self.field)
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == self.value)
    }
}

/// Abstract embedding + vector storage backend.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Human-readable backend description for status reporting.
    fn describe(&self) -> String;

    /// Insert records, overwriting any existing record with the same id.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()>;

    /// Return at most `k` records ranked for `query`.
    async fn search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<SearchHit>>;

    /// Delete every record whose metadata matches `filter`.
    async fn delete(&self, filter: &MetadataFilter) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_string_field_only() {
        let filter = MetadataFilter::source("doc1.pdf");
        let mut meta = Map::new();
        meta.insert("filename".into(), json!("doc1.pdf"));
        assert!(filter.matches(&meta));

        meta.insert("filename".into(), json!("doc2.pdf"));
        assert!(!filter.matches(&meta));

        meta.insert("filename".into(), json!(1));
        assert!(!filter.matches(&meta));
        assert!(!filter.matches(&Map::new()));
    }

    #[test]
    fn test_candidate_count() {
        assert_eq!(SearchMode::Similarity.candidate_count(6), 6);
        let mmr = SearchMode::Diversity {
            fetch_k: 20,
            lambda: 0.7,
        };
        assert_eq!(mmr.candidate_count(6), 20);
        assert_eq!(mmr.candidate_count(30), 30);
        assert_eq!(mmr.name(), "mmr");
    }
}
