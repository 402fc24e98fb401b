use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub analysis_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub batch_analysis: Option<BatchAnalysisConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BatchAnalysisConfig {
    pub backoff_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub concurrency: Option<usize>,
    pub rescan_interval_secs: Option<u64>,
    pub lease_secs: Option<u64>,
    pub content_language: Option<String>,
    pub scope: Option<String>,
    pub analyzable_types: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
