//! Stub server configuration, loaded from TOML with environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::SpecmockError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 binds an ephemeral port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Answer unmatched requests with a 400 report instead of a generated response
    #[serde(default)]
    pub strict: bool,
    /// Upstream that receives requests no stub matches
    #[serde(default)]
    pub passthrough_url: Option<String>,
    #[serde(default = "default_passthrough_timeout")]
    pub passthrough_timeout_secs: u64,
    /// Contract documents to serve
    #[serde(default)]
    pub contracts: Vec<PathBuf>,
    /// Directories of seed expectations
    #[serde(default)]
    pub expectation_dirs: Vec<PathBuf>,
    #[serde(default = "default_sse_capacity")]
    pub sse_channel_capacity: usize,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Upper bound on requests generated per scenario
    #[serde(default = "default_max_test_variants")]
    pub max_test_variants: usize,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_request_log_capacity")]
    pub request_log_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_passthrough_timeout() -> u64 {
    30
}
fn default_sse_capacity() -> usize {
    64
}
fn default_shutdown_grace() -> u64 {
    5
}
fn default_max_test_variants() -> usize {
    64
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_request_log_capacity() -> usize {
    1000
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            strict: false,
            passthrough_url: None,
            passthrough_timeout_secs: default_passthrough_timeout(),
            contracts: Vec::new(),
            expectation_dirs: Vec::new(),
            sse_channel_capacity: default_sse_capacity(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_test_variants: default_max_test_variants(),
            log_filter: default_log_filter(),
            request_log_capacity: default_request_log_capacity(),
        }
    }
}

impl StubConfig {
    /// Load from `path`, or from `specmock.toml` then
    /// `~/.config/specmock/config.toml`, else defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config: StubConfig = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).with_context(|| format!("Failed to parse config {}", p))?
            }
            None => {
                let mut candidates = vec![PathBuf::from("specmock.toml")];
                if let Some(home) = dirs::home_dir() {
                    candidates.push(home.join(".config/specmock/config.toml"));
                }

                let mut loaded = None;
                for candidate in &candidates {
                    if let Ok(content) = std::fs::read_to_string(candidate) {
                        loaded = Some(toml::from_str(&content).with_context(|| {
                            format!("Failed to parse config {}", candidate.display())
                        })?);
                        break;
                    }
                }
                loaded.unwrap_or_default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SPECMOCK_*` overrides. Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SPECMOCK_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("SPECMOCK_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(strict) = lookup("SPECMOCK_STRICT") {
            self.strict = matches!(strict.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = lookup("SPECMOCK_PASSTHROUGH_URL") {
            self.passthrough_url = Some(url).filter(|u| !u.is_empty());
        }
    }

    pub fn validate(&self) -> std::result::Result<(), SpecmockError> {
        if let Some(url) = &self.passthrough_url {
            url::Url::parse(url).map_err(|e| {
                SpecmockError::Config(format!("passthrough_url '{}' is not a valid URL: {}", url, e))
            })?;
        }
        if self.sse_channel_capacity == 0 {
            return Err(SpecmockError::Config(
                "sse_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_test_variants == 0 {
            return Err(SpecmockError::Config(
                "max_test_variants must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn passthrough_timeout(&self) -> Duration {
        Duration::from_secs(self.passthrough_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
