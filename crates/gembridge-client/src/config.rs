//! Process-wide adapter configuration.
//!
//! The configuration is a plain value that the boundary layer owns and
//! swaps at will; clients snapshot it at call time so updates take effect
//! for subsequent calls without any re-wiring.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default Gemini model-listing / generation endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Resolved adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            enabled: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GeminiConfig {
    /// Resolve key and base URL from `GEMINI_API_KEY` / `GEMINI_API_BASE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("GEMINI_API_BASE_URL") {
            if !url.is_empty() {
                config.api_base_url = url;
            }
        }
        config
    }

    /// Transport timeout for a single call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Swappable shared configuration, read through at call time.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<GeminiConfig>>);

impl SharedConfig {
    pub fn new(config: GeminiConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Current configuration. Callers get an owned copy, never the lock.
    pub fn snapshot(&self) -> GeminiConfig {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the configuration; subsequent snapshots see the new value.
    pub fn update(&self, config: GeminiConfig) {
        *self
            .0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }
}
