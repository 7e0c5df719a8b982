//! Local durable copy of the system instructions.
//!
//! A single JSON object at a fixed path:
//!
//! ```json
//! { "system_prompt": "You are a helpful AI assistant." }
//! ```
//!
//! A missing file, unreadable file, or malformed JSON is a cache miss.
//! Writes go to a uniquely named sibling temp file and are renamed into
//! place, so a crash mid-write never leaves a truncated copy. Saves within
//! one process are serialized.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use docchat_core::instructions::InstructionStore;

#[derive(Debug, Serialize, Deserialize)]
struct PromptFile {
    system_prompt: String,
}

pub struct JsonPromptFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPromptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InstructionStore for JsonPromptFile {
    async fn load(&self) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read instructions file");
                return Ok(None);
            }
        };
        match serde_json::from_str::<PromptFile>(&content) {
            Ok(file) => Ok(Some(file.system_prompt)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed instructions file");
                Ok(None)
            }
        }
    }

    async fn save(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&PromptFile {
            system_prompt: value.to_string(),
        })?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = JsonPromptFile::new(tmp.path().join("system_prompt.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = JsonPromptFile::new(tmp.path().join("nested/system_prompt.json"));
        store.save("You are a GTM assistant.").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("You are a GTM assistant.")
        );
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["system_prompt"], "You are a GTM assistant.");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_miss() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("system_prompt.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonPromptFile::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonPromptFile::new(tmp.path().join("system_prompt.json")));

        for round in 0..20 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move { store.save(&format!("persona {}-{}", round, i)).await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            let loaded = store.load().await.unwrap().unwrap();
            assert!(loaded.starts_with(&format!("persona {}-", round)), "{}", loaded);
        }

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }
}
