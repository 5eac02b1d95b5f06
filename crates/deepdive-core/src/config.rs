use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::provider::Provider;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Environment variables checked for the Gemini key, in order
const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_url: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Gemini)
    }

    /// `default_model` belongs to the configured provider; any other
    /// provider gets its built-in default.
    pub fn model_for(&self, provider: Provider) -> String {
        self.default_model
            .clone()
            .filter(|_| provider == self.provider())
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL)
    }

    /// Resolve the Gemini key: `env` lookups first, then the config file.
    /// Blank values are skipped.
    pub(crate) fn gemini_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        GEMINI_KEY_VARS
            .iter()
            .filter_map(|name| env(name))
            .find(|key| !key.trim().is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("deepdive").join("config.json"))
    }
}
