// Tandem host core - Configuration
// Settings file plus environment overrides

use crate::error::ConfigError;
use crate::port::PortRange;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names
pub mod env {
    pub const MODE: &str = "TANDEM_MODE";
    pub const PORT_MIN: &str = "TANDEM_PORT_MIN";
    pub const PORT_MAX: &str = "TANDEM_PORT_MAX";
    pub const DEV_SERVER_URL: &str = "TANDEM_DEV_SERVER_URL";
    pub const BACKEND_INTERPRETER: &str = "TANDEM_BACKEND_INTERPRETER";
    pub const BACKEND_SCRIPT: &str = "TANDEM_BACKEND_SCRIPT";
}

/// How the backend is started in development mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevBackend {
    pub interpreter: String,
    pub script: PathBuf,
}

impl Default for DevBackend {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script: PathBuf::from("app.py"),
        }
    }
}

/// Host settings. Every field falls back to its default when missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub port_range: PortRange,
    pub dev_server_url: String,
    pub dev_backend: DevBackend,
    /// Directory holding the packaged backend. The host substitutes its own
    /// resource directory when unset.
    pub resources_dir: Option<PathBuf>,
    pub production_entry: String,
    pub loader_page: String,
    pub quit_timeout_ms: u64,
    pub exit_grace_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            dev_server_url: "http://localhost:3000".to_string(),
            dev_backend: DevBackend::default(),
            resources_dir: None,
            production_entry: "index.html".to_string(),
            loader_page: "loading.html".to_string(),
            quit_timeout_ms: 3_000,
            exit_grace_ms: 2_000,
        }
    }
}

impl HostConfig {
    /// Load settings from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Apply `TANDEM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by the names in [`env`].
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env::PORT_MIN) {
            self.port_range.min = parse_port(env::PORT_MIN, value)?;
        }
        if let Some(value) = lookup(env::PORT_MAX) {
            self.port_range.max = parse_port(env::PORT_MAX, value)?;
        }
        if let Some(value) = lookup(env::DEV_SERVER_URL) {
            self.dev_server_url = value;
        }
        if let Some(value) = lookup(env::BACKEND_INTERPRETER) {
            self.dev_backend.interpreter = value;
        }
        if let Some(value) = lookup(env::BACKEND_SCRIPT) {
            self.dev_backend.script = PathBuf::from(value);
        }
        Ok(self)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    pub fn resources_dir_or(&self, fallback: &Path) -> PathBuf {
        self.resources_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
