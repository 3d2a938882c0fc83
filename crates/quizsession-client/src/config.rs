//! Client configuration and service factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizsession_core::runtime::SessionConfig;
use quizsession_core::traits::AttemptService;

use crate::http::{HttpAttemptService, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Top-level quizsession configuration.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the LMS API, e.g. `http://localhost:8000/api`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Transport timeout for each HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Upper bound on opening an attempt.
    #[serde(default = "default_request_timeout")]
    pub start_timeout_secs: u64,
    /// Upper bound on a submission before it counts as failed.
    #[serde(default = "default_request_timeout")]
    pub submit_timeout_secs: u64,
    /// Countdown tick period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("start_timeout_secs", &self.start_timeout_secs)
            .field("submit_timeout_secs", &self.submit_timeout_secs)
            .field("tick_ms", &self.tick_ms)
            .finish()
    }
}

fn default_api_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_tick_ms() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            request_timeout_secs: default_request_timeout(),
            start_timeout_secs: default_request_timeout(),
            submit_timeout_secs: default_request_timeout(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl ClientConfig {
    /// Session timing derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_period: Duration::from_millis(self.tick_ms.max(1)),
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizsession.toml` in the current directory
/// 2. `~/.config/quizsession/config.toml`
///
/// Environment variable overrides: `QUIZSESSION_API_URL`, `QUIZSESSION_TOKEN`.
pub fn load_config() -> Result<ClientConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ClientConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizsession.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ClientConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if let Ok(url) = std::env::var("QUIZSESSION_API_URL") {
        config.api_url = url;
    }
    if let Ok(token) = std::env::var("QUIZSESSION_TOKEN") {
        config.token = Some(token);
    }

    config.api_url = resolve_env_vars(&config.api_url);
    config.token = config
        .token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());

    tracing::debug!(?config, "loaded client config");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizsession"))
}

/// Create the grading service described by `config`.
pub fn create_service(config: &ClientConfig) -> Result<Arc<dyn AttemptService>> {
    let service = HttpAttemptService::new(
        &config.api_url,
        config.token.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .with_context(|| format!("failed to create service for {}", config.api_url))?;
    Ok(Arc::new(service))
}
