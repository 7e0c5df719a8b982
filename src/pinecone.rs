//! Pinecone-backed [`VectorIndex`].
//!
//! Talks to a serverless index's data-plane host:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `POST {host}/vectors/upsert` |
//! | search | `POST {host}/query` (`topK`, `includeMetadata`, `includeValues` for MMR) |
//! | delete | `POST {host}/vectors/delete` with `filter: { field: { "$eq": value } }` |
//!
//! Chunk text is stored in metadata under the configured `text_key`.
//! Authentication uses the `PINECONE_API_KEY` environment variable.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use docchat_core::embedding::Embedder;
use docchat_core::index::{IndexRecord, MetadataFilter, SearchHit, SearchMode, VectorIndex};
use docchat_core::mmr;

use crate::config::IndexConfig;
use crate::http;

const MAX_RETRIES: u32 = 3;

pub struct PineconeIndex {
    host: String,
    namespace: Option<String>,
    text_key: String,
    api_key: String,
    embedder: Arc<dyn Embedder>,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// # Errors
    ///
    /// Returns an error if `host` is not configured or `PINECONE_API_KEY` is missing.
    pub fn new(config: &IndexConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("index.host required for Pinecone provider"))?;
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            text_key: config.text_key.clone(),
            api_key,
            embedder,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.host, path);
        http::send_json("Pinecone API", MAX_RETRIES, || {
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .json(&body)
        })
        .await
        .with_context(|| format!("POST {}", path))
    }

    fn with_namespace(&self, mut body: Value) -> Value {
        if let (Some(ns), Some(obj)) = (&self.namespace, body.as_object_mut()) {
            obj.insert("namespace".to_string(), json!(ns));
        }
        body
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn describe(&self) -> String {
        format!("pinecone ({})", self.host)
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            bail!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                records.len()
            );
        }

        let payload: Vec<Value> = records
            .iter()
            .zip(vectors)
            .map(|(record, values)| {
                let mut metadata = record.metadata.clone();
                metadata.insert(self.text_key.clone(), json!(record.text));
                json!({ "id": record.id, "values": values, "metadata": metadata })
            })
            .collect();

        let body = self.with_namespace(json!({ "vectors": payload }));
        self.post("/vectors/upsert", body).await?;
        Ok(())
    }

    async fn search(&self, query: &str, mode: SearchMode, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;
        let diverse = matches!(mode, SearchMode::Diversity { .. });

        let body = self.with_namespace(json!({
            "vector": query_vec,
            "topK": mode.candidate_count(k),
            "includeMetadata": true,
            "includeValues": diverse,
        }));
        let response = self.post("/query", body).await?;
        let candidates = parse_matches(&response, &self.text_key)?;

        match mode {
            SearchMode::Similarity => Ok(candidates.into_iter().take(k).map(|(hit, _)| hit).collect()),
            SearchMode::Diversity { lambda, .. } => {
                let pool: Vec<Vec<f32>> = candidates.iter().map(|(_, v)| v.clone()).collect();
                let order = mmr::select(&query_vec, &pool, k, lambda);
                Ok(order.into_iter().map(|i| candidates[i].0.clone()).collect())
            }
        }
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<()> {
        let mut condition = Map::new();
        condition.insert(filter.field.clone(), json!({ "$eq": filter.value }));
        let body = self.with_namespace(json!({ "filter": condition }));
        self.post("/vectors/delete", body).await?;
        Ok(())
    }
}

/// Turn `matches[]` into hits paired with their stored vectors (empty when
/// values were not requested). The text field is moved out of metadata.
fn parse_matches(json: &Value, text_key: &str) -> Result<Vec<(SearchHit, Vec<f32>)>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone response: missing matches array"))?;

    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let mut metadata: Map<String, Value> = m
            .get("metadata")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let text = match metadata.remove(text_key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
        let values: Vec<f32> = m
            .get("values")
            .and_then(|v| v.as_array())
            .map(|vals| vals.iter().map(|x| x.as_f64().unwrap_or(0.0) as f32).collect())
            .unwrap_or_default();
        out.push((
            SearchHit {
                text,
                metadata,
                score,
            },
            values,
        ));
    }
    Ok(out)
}
