use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalyzerConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::retry::RetryPolicy;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DATA_DIR_ENV: &str = "PROMPT_LENS_DATA_DIR";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
  pub endpoint: String,
  pub model: String,
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub port: u16,
}

impl Default for AppConfig {
  fn default() -> Self {
    let retry = RetryPolicy::default();
    Self {
      endpoint: DEFAULT_ENDPOINT.to_string(),
      model: DEFAULT_MODEL.to_string(),
      max_retries: retry.max_retries,
      base_delay_ms: retry.base_delay.as_millis() as u64,
      port: 8787,
    }
  }
}

impl AppConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      base_delay: Duration::from_millis(self.base_delay_ms),
    }
  }

  pub fn analyzer_config(&self, api_key: String) -> AnalyzerConfig {
    AnalyzerConfig {
      endpoint: self.endpoint.clone(),
      model: self.model.clone(),
      api_key,
      retry: self.retry_policy(),
    }
  }
}

/// `$PROMPT_LENS_DATA_DIR`, else `<platform data dir>/prompt-lens`.
pub fn data_dir() -> anyhow::Result<PathBuf> {
  if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
    return Ok(PathBuf::from(dir));
  }
  let base = dirs::data_dir().context("missing platform data dir")?;
  Ok(base.join("prompt-lens"))
}

/// Credential from the environment. An empty string means "not configured".
pub fn api_key_from_env() -> String {
  std::env::var(API_KEY_ENV)
    .map(|k| k.trim().to_string())
    .unwrap_or_default()
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  if path.exists() {
    let data = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&data)
      .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config)
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
  }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json)?;
  Ok(())
}
