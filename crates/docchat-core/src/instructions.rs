//! Operator-editable system instructions with three-tier resolution.
//!
//! The [`InstructionCache`] owns a single in-memory slot and two optional
//! backing tiers:
//!
//! | Tier | Backing | Role |
//! |------|---------|------|
//! | memory | `RwLock<Option<Arc<str>>>` | authoritative once populated |
//! | remote | [`InstructionSource`] | external source of truth, may be unreachable |
//! | local | [`InstructionStore`] | durable copy, survives restarts |
//!
//! When nothing resolves, a non-empty baseline string is returned. The
//! memory slot is replaced by a single assignment, so concurrent readers see
//! the old or the new value, never a mix. No lock is held across an await.
//!
//! Persistence failures are logged and never fail a read or an update.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result, Stage};

/// Used when the configured baseline is blank.
pub const DEFAULT_BASELINE: &str = "You are a helpful AI assistant.";

/// Remote source of truth for the instructions.
#[async_trait]
pub trait InstructionSource: Send + Sync {
    fn describe(&self) -> String;

    /// Fetch the stored value. `Ok(None)` means the store answered but holds
    /// no value.
    async fn fetch(&self) -> AnyResult<Option<String>>;
}

/// Durable local copy of the instructions.
#[async_trait]
pub trait InstructionStore: Send + Sync {
    /// Read the stored value. A missing or unreadable copy is `Ok(None)`.
    async fn load(&self) -> AnyResult<Option<String>>;

    async fn save(&self, value: &str) -> AnyResult<()>;
}

/// Which tier produced a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Remote,
    Local,
    Baseline,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Remote => "remote",
            Tier::Local => "local",
            Tier::Baseline => "baseline",
        }
    }
}

#[derive(Debug)]
pub struct Resolved {
    pub value: Arc<str>,
    pub tier: Tier,
    /// Set when the remote tier was tried and failed.
    pub remote_error: Option<PipelineError>,
}

/// Result of [`InstructionCache::set`]. The update itself always applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReceipt {
    pub persisted: bool,
    pub warning: Option<String>,
}

pub struct InstructionCache {
    memory: RwLock<Option<Arc<str>>>,
    baseline: Arc<str>,
    remote: Option<Arc<dyn InstructionSource>>,
    local: Option<Arc<dyn InstructionStore>>,
}

impl InstructionCache {
    pub fn new(baseline: impl Into<String>) -> Self {
        let baseline: String = baseline.into();
        let baseline = if baseline.trim().is_empty() {
            DEFAULT_BASELINE.to_string()
        } else {
            baseline
        };
        Self {
            memory: RwLock::new(None),
            baseline: Arc::from(baseline),
            remote: None,
            local: None,
        }
    }

    pub fn with_remote(mut self, source: Arc<dyn InstructionSource>) -> Self {
        self.remote = Some(source);
        self
    }

    pub fn with_local(mut self, store: Arc<dyn InstructionStore>) -> Self {
        self.local = Some(store);
        self
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Peek at the memory slot without any I/O.
    pub fn current(&self) -> Option<Arc<str>> {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current instructions. Never fails.
    pub async fn get(&self, force_sync: bool) -> String {
        self.resolve(force_sync).await.value.to_string()
    }

    /// Walk the tiers: memory (unless forced), remote, local, baseline.
    ///
    /// A forced sync that cannot reach the remote keeps an existing memory
    /// value, since memory is written through on every successful read and
    /// update and is never older than the local copy.
    pub async fn resolve(&self, force_sync: bool) -> Resolved {
        if !force_sync {
            if let Some(value) = self.current() {
                return Resolved {
                    value,
                    tier: Tier::Memory,
                    remote_error: None,
                };
            }
        }

        let mut remote_error = None;
        if let Some(remote) = &self.remote {
            match remote.fetch().await {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    let value: Arc<str> = Arc::from(value);
                    self.store_memory(value.clone());
                    self.persist(&value).await;
                    debug!(source = %remote.describe(), "system instructions synced from remote");
                    return Resolved {
                        value,
                        tier: Tier::Remote,
                        remote_error: None,
                    };
                }
                Ok(_) => debug!("remote holds no system instructions"),
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "remote instruction fetch failed");
                    remote_error = Some(PipelineError::transient(Stage::Instructions, &e));
                }
            }
        }

        if let Some(value) = self.current() {
            return Resolved {
                value,
                tier: Tier::Memory,
                remote_error,
            };
        }

        if let Some(local) = &self.local {
            match local.load().await {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    let value: Arc<str> = Arc::from(value);
                    self.store_memory(value.clone());
                    return Resolved {
                        value,
                        tier: Tier::Local,
                        remote_error,
                    };
                }
                Ok(_) => {}
                Err(e) => warn!(error = %format!("{:#}", e), "local instruction copy unreadable"),
            }
        }

        Resolved {
            value: self.baseline.clone(),
            tier: Tier::Baseline,
            remote_error,
        }
    }

    /// Replace the instructions. Blank values are rejected and leave the
    /// stored value untouched.
    pub async fn set(&self, value: &str) -> Result<SetReceipt> {
        if value.trim().is_empty() {
            return Err(PipelineError::validation("System prompt cannot be empty"));
        }
        let value: Arc<str> = Arc::from(value);
        self.store_memory(value.clone());
        let receipt = match self.persist(&value).await {
            Some(warning) => SetReceipt {
                persisted: false,
                warning: Some(warning),
            },
            None => SetReceipt {
                persisted: self.local.is_some(),
                warning: None,
            },
        };
        info!(persisted = receipt.persisted, "system instructions updated");
        Ok(receipt)
    }

    /// Startup sync: force a remote read and report where the value came from.
    pub async fn warm_up(&self) -> Resolved {
        let resolved = self.resolve(true).await;
        info!(tier = resolved.tier.as_str(), "system instructions ready");
        resolved
    }

    fn store_memory(&self, value: Arc<str>) {
        *self.memory.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Best-effort write to the local copy. Returns a warning on failure.
    ///
    /// A concurrent update may land in memory while this save is in flight;
    /// the save is repeated with the newer value so the local copy ends on
    /// what memory holds.
    async fn persist(&self, value: &Arc<str>) -> Option<String> {
        let local = self.local.as_ref()?;
        let mut value = value.clone();
        loop {
            if let Err(e) = local.save(&value).await {
                let warning = format!("failed to persist system instructions: {:#}", e);
                warn!("{}", warning);
                return Some(warning);
            }
            match self.current() {
                Some(latest) if latest != value => value = latest,
                _ => return None,
            }
        }
    }
}
