use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::alerts::AlertConfig;

const DEFAULT_CONFIG_FILE: &str = "triage-dash.json";

const ENV_CONFIG_FILE: &str = "TRIAGE_DASH_CONFIG";
const ENV_WEBAPP_URL: &str = "TRIAGE_WEBAPP_URL";
const ENV_BACKEND_TOKEN: &str = "TRIAGE_BACKEND_TOKEN";
const ENV_HANDOFF_SECRET: &str = "TRIAGE_HANDOFF_SECRET";
const ENV_HANDOFF_BASE_URL: &str = "TRIAGE_HANDOFF_BASE_URL";
const ENV_BELL: &str = "TRIAGE_BELL";

/// On-disk settings; every field may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub webapp_url: Option<String>,
    pub backend_token: Option<String>,
    pub handoff_secret: Option<String>,
    pub handoff_base_url: Option<String>,
    pub bell: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub webapp_url: String,
    /// Optional shared secret sent with every backend request.
    pub backend_token: Option<String>,
    pub handoff_secret: Option<String>,
    /// Where the receiving dashboard instance is deployed.
    pub handoff_base_url: Option<String>,
    pub alerts: AlertConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file = read_config_file(&path)?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |key: &str, fallback: Option<String>| {
            env(key)
                .or(fallback)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let webapp_url = pick(ENV_WEBAPP_URL, file.webapp_url).ok_or_else(|| {
            anyhow::anyhow!(
                "missing row backend URL; set {} or add to {}:\n  {{ \"webapp_url\": \"https://script.google.com/macros/s/XXX/exec\" }}",
                ENV_WEBAPP_URL,
                DEFAULT_CONFIG_FILE
            )
        })?;

        let bell = match env(ENV_BELL) {
            Some(v) => v == "1" || v == "true",
            None => file.bell.unwrap_or(AlertConfig::default().bell),
        };

        Ok(Self {
            webapp_url,
            backend_token: pick(ENV_BACKEND_TOKEN, file.backend_token),
            handoff_secret: pick(ENV_HANDOFF_SECRET, file.handoff_secret),
            handoff_base_url: pick(ENV_HANDOFF_BASE_URL, file.handoff_base_url),
            alerts: AlertConfig { bell },
        })
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        log::debug!("no config file at {}, using environment only", path.display());
        return Ok(ConfigFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
}
