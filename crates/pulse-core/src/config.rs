//! Client configuration.
//!
//! Resolution order: explicit path, then `<config dir>/pulse/config.yaml` if
//! it exists, then built-in defaults. Environment variables override
//! whatever was loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::DEFAULT_MAX_CARRY_BYTES;
use crate::request::{GenerateRequest, ReasoningEffort, ReasoningSummary};

pub const BACKEND_URL_ENV: &str = "PULSE_BACKEND_URL";
pub const INACTIVITY_TIMEOUT_ENV: &str = "PULSE_INACTIVITY_TIMEOUT_SECS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub defaults: RequestDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub generate_path: String,
    /// Connect/headers timeout for the initial request. The body itself is
    /// governed by the session inactivity timeout.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            generate_path: "/chat".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum silence between deliveries before the session fails.
    pub inactivity_timeout_secs: u64,
    pub max_carry_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 120,
            max_carry_bytes: DEFAULT_MAX_CARRY_BYTES,
        }
    }
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub platforms: Vec<String>,
    pub content_type: String,
    pub language: String,
    pub reasoning_effort: ReasoningEffort,
    pub reasoning_summary: ReasoningSummary,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            platforms: vec!["linkedin".to_string()],
            content_type: "post".to_string(),
            language: "en".to_string(),
            reasoning_effort: ReasoningEffort::default(),
            reasoning_summary: ReasoningSummary::default(),
        }
    }
}

impl RequestDefaults {
    /// A new request for `message` using these defaults.
    pub fn request(&self, message: impl Into<String>) -> GenerateRequest {
        GenerateRequest::new(message)
            .with_platforms(self.platforms.iter().cloned())
            .with_content_type(self.content_type.clone())
            .with_language(self.language.clone())
            .with_reasoning(self.reasoning_effort, self.reasoning_summary)
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse configuration YAML")?;
        if config.session.inactivity_timeout_secs == 0 {
            warn!("Ignoring session.inactivity_timeout_secs = 0: the timeout must be at least 1s");
            config.session.inactivity_timeout_secs = SessionConfig::default().inactivity_timeout_secs;
        }
        Ok(config)
    }

    /// Load configuration from `path` (tilde-expanded) or the default
    /// location, then apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
                Self::load_file(&expanded)?
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default) => Self::load_file(&default)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var(INACTIVITY_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(0) => warn!("Ignoring {}=0: the timeout must be at least 1s", INACTIVITY_TIMEOUT_ENV),
                Ok(secs) => self.session.inactivity_timeout_secs = secs,
                Err(e) => warn!("Ignoring {}={:?}: {}", INACTIVITY_TIMEOUT_ENV, raw, e),
            }
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pulse").join("config.yaml"))
}
