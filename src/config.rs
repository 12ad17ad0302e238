//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::gate::ModerationFailurePolicy;

/// Default agent preamble.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Be friendly, helpful, and engaging in your responses.";

/// Default topic the relay consumes from and publishes to.
pub const DEFAULT_TOPIC: &str = "mcp_agent_queen";

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Relay name for identification in logs.
    pub name: String,
    /// Topic to read from and publish replies to.
    pub topic: String,
    /// Upper bound on a single backend call.
    pub backend_timeout: Duration,
    /// What to do when the moderation engine itself fails.
    pub moderation_failure: ModerationFailurePolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "agent-relay".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            backend_timeout: Duration::from_secs(120),
            moderation_failure: ModerationFailurePolicy::FailClosed,
        }
    }
}

impl RouterConfig {
    /// Read router configuration from the environment, falling back to defaults.
    ///
    /// - `RELAY_NAME`
    /// - `RELAY_TOPIC`
    /// - `RELAY_BACKEND_TIMEOUT_SECS`
    /// - `RELAY_MODERATION_FAIL_OPEN` (`true` to let messages through when
    ///   moderation errors; blocked by default)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_secs: u64 = env_parse(
            "RELAY_BACKEND_TIMEOUT_SECS",
            defaults.backend_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_BACKEND_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let moderation_failure = if env_parse("RELAY_MODERATION_FAIL_OPEN", false)? {
            ModerationFailurePolicy::FailOpen
        } else {
            ModerationFailurePolicy::FailClosed
        };

        Ok(Self {
            name: env_or("RELAY_NAME", &defaults.name),
            topic: env_or("RELAY_TOPIC", &defaults.topic),
            backend_timeout: Duration::from_secs(timeout_secs),
            moderation_failure,
        })
    }
}

/// Read a string variable, using `default` when unset or blank.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse a variable, using `default` when unset. Unparseable values are errors.
pub(crate) fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
