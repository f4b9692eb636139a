//! Configuration management for Shield.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ShieldError};
use crate::ratelimit::{LimitConfig, Limiter, MemoryLimiter, RedisLimiter, DEFAULT_KEY_PREFIX};

/// Prefix for environment variable overrides, e.g. `SHIELD__LIMITER__LIMIT=10`.
const ENV_PREFIX: &str = "SHIELD";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for Shield.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Limit and window enforced per identifier
    #[serde(default)]
    pub limiter: LimitConfig,

    /// Which engine enforces the limit
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Engine selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local state
    #[default]
    Memory,
    /// Shared Redis state
    Redis,
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Engine to build
    #[serde(default)]
    pub kind: BackendKind,

    /// Redis connection URL, required for the Redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for Redis window keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Deadline applied to each admission by callers of the limiter
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Per-admission deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

impl ShieldConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ShieldConfig =
            serde_yaml::from_str(yaml).map_err(|e| ShieldError::Config(e.to_string()))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply `SHIELD__*`
    /// environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: ShieldConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ShieldError::Config(e.to_string()))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Build the configured limiter.
    ///
    /// The memory backend must be built from within a Tokio runtime.
    pub async fn build_limiter(&self) -> Result<Arc<dyn Limiter>> {
        match self.backend.kind {
            BackendKind::Memory => {
                info!("Using in-memory backend");
                Ok(Arc::new(MemoryLimiter::new(self.limiter)?))
            }
            BackendKind::Redis => {
                let url = self.backend.redis_url.as_deref().ok_or_else(|| {
                    ShieldError::Config("redis backend requires redis_url".to_string())
                })?;
                info!(prefix = %self.backend.key_prefix, "Using Redis backend");
                let limiter = RedisLimiter::connect(url, self.limiter)
                    .await?
                    .with_prefix(self.backend.key_prefix.clone());
                Ok(Arc::new(limiter))
            }
        }
    }
}
