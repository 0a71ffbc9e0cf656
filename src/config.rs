//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default step budget for one orchestration run.
pub const DEFAULT_MAX_STEPS: usize = 8;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification in logs.
    pub name: String,
    /// Maximum reasoning-service round trips per email.
    pub max_steps: usize,
    /// Sampling temperature for the reasoning service.
    pub temperature: f32,
    /// Optional cap on tokens per reasoning response.
    pub max_tokens: Option<u32>,
    /// Per-link timeout for link reputation lookups.
    pub link_timeout: Duration,
    /// Caller-level timeout around a whole analysis (`None` = unbounded).
    pub analysis_timeout: Option<Duration>,
    /// How many emails a batch analyzes at once.
    pub batch_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "phish-agent".to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            temperature: 0.0,
            max_tokens: None,
            link_timeout: Duration::from_secs(10),
            analysis_timeout: Some(Duration::from_secs(120)),
            batch_concurrency: 4,
        }
    }
}

impl AgentConfig {
    /// Build config from `PHISH_AGENT_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_steps = env_or("PHISH_AGENT_MAX_STEPS", defaults.max_steps)?;
        if max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PHISH_AGENT_MAX_STEPS".into(),
                message: "must be at least 1".into(),
            });
        }

        let temperature = env_or("PHISH_AGENT_TEMPERATURE", defaults.temperature)?;
        let max_tokens = env_opt::<u32>("PHISH_AGENT_MAX_TOKENS")?;
        let link_timeout_secs = env_or("PHISH_AGENT_LINK_TIMEOUT_SECS", 10u64)?;

        // 0 disables the caller-level timeout
        let timeout_secs = env_or("PHISH_AGENT_TIMEOUT_SECS", 120u64)?;
        let analysis_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let batch_concurrency =
            env_or("PHISH_AGENT_BATCH_CONCURRENCY", defaults.batch_concurrency)?.max(1);

        Ok(Self {
            name: std::env::var("PHISH_AGENT_NAME").unwrap_or(defaults.name),
            max_steps,
            temperature,
            max_tokens,
            link_timeout: Duration::from_secs(link_timeout_secs),
            analysis_timeout,
            batch_concurrency,
        })
    }
}

/// Read and parse an env var, using `default` when it is unset.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

/// Read and parse an optional env var. Empty values count as unset.
pub(crate) fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}
