//! Remote instruction source backed by a Supabase `system_settings` table.
//!
//! Issues one PostgREST query per fetch, without retries:
//!
//! ```text
//! GET {url}/rest/v1/system_settings?select=setting_value&setting_key=eq.system_prompt
//! apikey: <key>
//! Authorization: Bearer <key>
//! ```
//!
//! The response is a JSON array; the first row's `setting_value` is the
//! instructions. An empty array means the store holds no value.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use docchat_core::instructions::InstructionSource;

use crate::config::InstructionsConfig;
use crate::http;

const SETTING_KEY: &str = "system_prompt";

pub struct SupabaseSource {
    base_url: String,
    key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    setting_value: Option<String>,
}

impl SupabaseSource {
    pub fn new(base_url: &str, key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            client: http::client(timeout_secs)?,
        })
    }

    /// Build the source from configuration. Returns `Ok(None)` when no
    /// remote URL is configured or the key variable is unset.
    pub fn from_config(config: &InstructionsConfig) -> Result<Option<Self>> {
        let Some(url) = config.remote_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let key = match std::env::var(&config.remote_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::warn!(
                    var = %config.remote_key_env,
                    "remote instructions URL set but key variable is empty, remote sync disabled"
                );
                return Ok(None);
            }
        };
        Ok(Some(Self::new(url, key, config.timeout_secs)?))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/system_settings?select=setting_value&setting_key=eq.{}",
            self.base_url, SETTING_KEY
        )
    }
}

#[async_trait]
impl InstructionSource for SupabaseSource {
    fn describe(&self) -> String {
        format!("supabase ({})", self.base_url)
    }

    async fn fetch(&self) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.endpoint())
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .send()
            .await
            .context("Supabase request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Supabase error {}: {}", status, body);
        }

        let rows: Vec<SettingRow> = response
            .json()
            .await
            .context("Invalid Supabase response")?;
        Ok(first_value(rows))
    }
}

fn first_value(rows: Vec<SettingRow>) -> Option<String> {
    rows.into_iter().next().and_then(|row| row.setting_value)
}
