//! Instruction cache behavior across tiers.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use common::{orchestrator, CountingSource, MemoryStore, ScriptedModel};
use docchat_core::instructions::{InstructionCache, InstructionStore, Tier};

#[tokio::test]
async fn repeated_get_short_circuits_through_memory() {
    let remote = CountingSource::new(Some("Remote persona"));
    let local = Arc::new(MemoryStore::default());
    let cache = InstructionCache::new("baseline")
        .with_remote(remote.clone())
        .with_local(local.clone());

    let first = cache.get(false).await;
    let io_after_first = remote.count() + local.loads.load(Ordering::SeqCst);
    let second = cache.get(false).await;
    let io_after_second = remote.count() + local.loads.load(Ordering::SeqCst);

    assert_eq!(first, second);
    assert_eq!(first, "Remote persona");
    assert_eq!(io_after_first, 1);
    assert_eq!(io_after_second, io_after_first);
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let local = Arc::new(MemoryStore::default());
    let cache = InstructionCache::new("baseline").with_local(local.clone());

    let receipt = cache.set("You are a launch planner.").await.unwrap();

    assert!(receipt.persisted);
    assert_eq!(cache.get(false).await, "You are a launch planner.");
    assert_eq!(
        local.value.lock().unwrap().as_deref(),
        Some("You are a launch planner.")
    );
}

#[tokio::test]
async fn rejected_set_keeps_prior_value() {
    let cache = InstructionCache::new("baseline");
    cache.set("Original").await.unwrap();
    for bad in ["", "   ", "\n\t"] {
        let err = cache.set(bad).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "System prompt cannot be empty");
    }
    assert_eq!(cache.get(false).await, "Original");
}

#[tokio::test]
async fn forced_sync_refreshes_from_remote() {
    let remote = CountingSource::new(Some("Fresh persona"));
    let cache = InstructionCache::new("baseline").with_remote(remote.clone());
    cache.set("Stale persona").await.unwrap();

    assert_eq!(cache.get(false).await, "Stale persona");
    assert_eq!(remote.count(), 0);

    let resolved = cache.resolve(true).await;
    assert_eq!(resolved.tier, Tier::Remote);
    assert_eq!(&*resolved.value, "Fresh persona");
    assert_eq!(cache.get(false).await, "Fresh persona");
}

#[tokio::test]
async fn warm_up_tolerates_unreachable_remote() {
    let local = Arc::new(MemoryStore::default());
    *local.value.lock().unwrap() = Some("Saved persona".to_string());
    let cache = InstructionCache::new("baseline")
        .with_remote(CountingSource::new(None))
        .with_local(local);

    let resolved = cache.warm_up().await;

    assert_eq!(resolved.tier, Tier::Local);
    assert!(resolved.remote_error.is_some());
    assert_eq!(cache.current().as_deref(), Some("Saved persona"));
}

#[tokio::test]
async fn turn_prompt_uses_current_instructions() {
    let model = ScriptedModel::new(|_| Ok("Hi there!".to_string()));
    let cache = InstructionCache::new("baseline");
    cache.set("You speak like a pirate.").await.unwrap();
    let orch = orchestrator(model.clone(), None, cache);

    orch.run_turn("Hello", &[]).await;

    assert!(model.prompts()[0].starts_with("You speak like a pirate."));
}

/// Local store whose save yields mid-write, so concurrent saves interleave.
#[derive(Default)]
struct SlowStore {
    value: Mutex<Option<String>>,
}

#[async_trait]
impl InstructionStore for SlowStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.value.lock().unwrap().clone())
    }

    async fn save(&self, value: &str) -> Result<()> {
        tokio::task::yield_now().await;
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_and_get_never_tear() {
    let long_a = "A".repeat(4096);
    let long_b = "B".repeat(4096);
    let local = Arc::new(SlowStore::default());
    let cache = Arc::new(InstructionCache::new("baseline").with_local(local.clone()));
    cache.set(&long_a).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let cache = cache.clone();
        let value = if i % 2 == 0 { long_a.clone() } else { long_b.clone() };
        handles.push(tokio::spawn(async move {
            for _ in 0..200 {
                cache.set(&value).await.unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let cache = cache.clone();
        let (a, b) = (long_a.clone(), long_b.clone());
        handles.push(tokio::spawn(async move {
            for _ in 0..500 {
                let seen = cache.get(false).await;
                assert!(seen == a || seen == b, "torn read of {} bytes", seen.len());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let in_memory = cache.get(false).await;
    assert_eq!(local.value.lock().unwrap().as_deref(), Some(in_memory.as_str()));
}
