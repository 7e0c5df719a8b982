//! In-process fakes for the collaborator traits.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map};

use docchat_core::contextualize::{QueryContextualizer, RewritePolicy};
use docchat_core::index::{IndexRecord, MetadataFilter, SearchHit, SearchMode, VectorIndex};
use docchat_core::instructions::{InstructionCache, InstructionSource, InstructionStore};
use docchat_core::llm::LanguageModel;
use docchat_core::retriever::{RetrievalPolicy, RetrieverAdapter};
use docchat_core::synthesize::AnswerSynthesizer;
use docchat_core::TurnOrchestrator;

type Script = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Language model that answers through a closure and records every prompt.
pub struct ScriptedModel {
    script: Script,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| anyhow::bail!("model provider returned 503"))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// The last prompt that was a synthesis prompt (ends in "Answer:").
    pub fn synthesis_prompt(&self) -> Option<String> {
        self.prompts()
            .into_iter()
            .rev()
            .find(|p| p.ends_with("Answer:"))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.script)(prompt)
    }
}

/// Index that returns a fixed ranked list, or fails.
pub struct StaticIndex {
    hits: Vec<SearchHit>,
    fail: bool,
    pub searches: AtomicUsize,
}

impl StaticIndex {
    pub fn with_hits(hits: &[(&str, &str)]) -> Arc<Self> {
        let hits = hits
            .iter()
            .map(|(text, file)| {
                let mut metadata = Map::new();
                metadata.insert("filename".into(), json!(file));
                SearchHit {
                    text: text.to_string(),
                    metadata,
                    score: 0.8,
                }
            })
            .collect();
        Arc::new(Self {
            hits,
            fail: false,
            searches: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::with_hits(&[])
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            hits: Vec::new(),
            fail: true,
            searches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn upsert(&self, _records: &[IndexRecord]) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str, _mode: SearchMode, k: usize) -> Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("index connection reset");
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    async fn delete(&self, _filter: &MetadataFilter) -> Result<()> {
        Ok(())
    }
}

/// Remote instruction source that counts fetches.
pub struct CountingSource {
    value: Option<String>,
    pub fetches: AtomicUsize,
}

impl CountingSource {
    pub fn new(value: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            value: value.map(str::to_string),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstructionSource for CountingSource {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    async fn fetch(&self) -> Result<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.value {
            Some(v) => Ok(Some(v.clone())),
            None => anyhow::bail!("remote store unreachable"),
        }
    }
}

/// Local store held in memory, counting reads and writes.
#[derive(Default)]
pub struct MemoryStore {
    pub value: Mutex<Option<String>>,
    pub loads: AtomicUsize,
    pub saves: AtomicUsize,
}

#[async_trait]
impl InstructionStore for MemoryStore {
    async fn load(&self) -> Result<Option<String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.lock().unwrap().clone())
    }

    async fn save(&self, value: &str) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }
}

pub fn orchestrator(
    model: Arc<ScriptedModel>,
    index: Option<Arc<StaticIndex>>,
    instructions: InstructionCache,
) -> TurnOrchestrator {
    let retriever = match index {
        Some(index) => RetrieverAdapter::new(index, RetrievalPolicy::default()),
        None => RetrieverAdapter::disabled(),
    };
    TurnOrchestrator::new(
        Arc::new(instructions),
        QueryContextualizer::new(model.clone(), RewritePolicy::default()),
        retriever,
        AnswerSynthesizer::new(model, 8),
    )
}
