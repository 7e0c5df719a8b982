//! In-memory [`VectorIndex`] implementation for local runs and tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector; diversity mode
//! runs [`mmr::select`](crate::mmr::select) over the best candidates.
//! Embedding happens before any lock is taken.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::mmr;

use super::{IndexRecord, MetadataFilter, SearchHit, SearchMode, VectorIndex};

struct StoredRecord {
    record: IndexRecord,
    vector: Vec<f32>,
}

/// In-memory vector index backed by an [`Embedder`].
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn describe(&self) -> String {
        format!("memory ({})", self.embedder.model_name())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                records.len()
            );
        }

        let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let mut stored = self.records.write().unwrap_or_else(PoisonError::into_inner);
        stored.retain(|s| !ids.contains(s.record.id.as_str()));
        for (record, vector) in records.iter().zip(vectors) {
            stored.push(StoredRecord {
                record: record.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;

        let stored = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, f32)> = stored
            .iter()
            .enumerate()
            .map(|(i, s)| (i, cosine_similarity(&query_vec, &s.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(mode.candidate_count(k));

        let order: Vec<(usize, f32)> = match mode {
            SearchMode::Similarity => scored.into_iter().take(k).collect(),
            SearchMode::Diversity { lambda, .. } => {
                let pool: Vec<Vec<f32>> = scored
                    .iter()
                    .map(|(i, _)| stored[*i].vector.clone())
                    .collect();
                mmr::select(&query_vec, &pool, k, lambda)
                    .into_iter()
                    .map(|p| scored[p])
                    .collect()
            }
        };

        Ok(order
            .into_iter()
            .map(|(i, score)| SearchHit {
                text: stored[i].record.text.clone(),
                metadata: stored[i].record.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<()> {
        let mut stored = self.records.write().unwrap_or_else(PoisonError::into_inner);
        stored.retain(|s| !filter.matches(&s.record.metadata));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    /// Two-dimensional embedder: counts of "rust" and "python" in the text.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("rust").count() as f32 + 0.01,
                        t.matches("python").count() as f32 + 0.01,
                    ]
                })
                .collect())
        }
    }

    fn record(id: &str, text: &str, file: &str) -> IndexRecord {
        let mut metadata = Map::new();
        metadata.insert("filename".into(), json!(file));
        IndexRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_by_cosine() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index
            .upsert(&[
                record("a", "python python", "py.md"),
                record("b", "rust and more rust", "rs.md"),
            ])
            .await
            .unwrap();

        let hits = index.search("rust", SearchMode::Similarity, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata_str("filename"), Some("rs.md"));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index.upsert(&[record("a", "rust", "one.md")]).await.unwrap();
        index.upsert(&[record("a", "python", "two.md")]).await.unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search("python", SearchMode::Similarity, 5).await.unwrap();
        assert_eq!(hits[0].text, "python");
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index
            .upsert(&[
                record("a", "rust", "keep.md"),
                record("b", "rust", "drop.md"),
                record("c", "python", "drop.md"),
            ])
            .await
            .unwrap();
        index.delete(&MetadataFilter::source("drop.md")).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_diversity_mode_returns_k_distinct() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index
            .upsert(&[
                record("a", "rust", "a.md"),
                record("b", "rust", "b.md"),
                record("c", "rust python", "c.md"),
            ])
            .await
            .unwrap();
        let mode = SearchMode::Diversity {
            fetch_k: 3,
            lambda: 0.3,
        };
        let hits = index.search("rust", mode, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].metadata_str("filename"), Some("c.md"));
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder));
        index.upsert(&[record("a", "rust", "a.md")]).await.unwrap();
        assert!(index
            .search("   ", SearchMode::Similarity, 3)
            .await
            .unwrap()
            .is_empty());
    }
}
