use crate::connection::RetryPolicy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)(?::([^}]*))?\}").expect("placeholder pattern is valid"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Application selector sent with every request.
    pub app: Option<String>,
    pub retry: RetryConfig,
    pub rpc_timeout_secs: f64,
    pub stream_idle_timeout_secs: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50051,
            app: None,
            retry: RetryConfig::default(),
            rpc_timeout_secs: 30.0,
            stream_idle_timeout_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 10.0,
        }
    }
}

impl ClientConfig {
    /// Reads a TOML file, resolving placeholders from the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&raw, &HashMap::new(), |name| env::var(name).ok())
    }

    pub fn from_toml_str<F>(raw: &str, replacements: &HashMap<String, String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = interpolate(raw, replacements, lookup);
        Ok(toml::from_str(&resolved)?)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: seconds(self.retry.base_delay_secs),
            max_delay: seconds(self.retry.max_delay_secs),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        seconds(self.rpc_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        seconds(self.stream_idle_timeout_secs)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Replaces `${KEY}` and `${KEY:default}`. Lookup order: `replacements`
/// (case-insensitive), `lookup` with the upper-case then lower-case name,
/// the default, then the empty string.
pub fn interpolate<F>(input: &str, replacements: &HashMap<String, String>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let key = caps[1].to_lowercase();
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            let value = replacements
                .iter()
                .find(|(name, _)| name.to_lowercase() == key)
                .map(|(_, value)| value.clone())
                .or_else(|| lookup(&key.to_uppercase()))
                .or_else(|| lookup(&key))
                .unwrap_or_else(|| default.to_string());

            debug!(placeholder = &caps[0], "resolved config placeholder");
            value
        })
        .into_owned()
}
