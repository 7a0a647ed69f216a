//! Runtime and per-session configuration

use crate::retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration, resolved from CLI flags at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Requested capability names; `core` expands to the full set
    pub capabilities: Vec<String>,
    /// Idle time after which the sweep tears a session down
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    /// Interval of the TTL sweep, independent of per-call activity
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Deadline applied per driver call attempt
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Retry schedule for driver calls
    pub retry: RetryOptions,
    /// Base directory for session reports and failure artifacts
    pub output_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            capabilities: vec!["core".to_string()],
            session_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
            retry: RetryOptions::default(),
            output_dir: PathBuf::from("drover-out"),
        }
    }
}

impl RuntimeConfig {
    /// The per-session configuration bag derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capabilities: self.capabilities.clone(),
            call_timeout: self.call_timeout,
            retry: self.retry.clone(),
        }
    }
}

/// Configuration carried by each session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Resolved capability list the session was created with
    pub capabilities: Vec<String>,
    /// Deadline per driver call attempt
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Retry schedule for driver calls
    pub retry: RetryOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        RuntimeConfig::default().session_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_deserialize_from_humantime_strings() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"session_timeout": "5m", "call_timeout": "10s", "retry": {"max_attempts": 1, "base_delay": "100ms", "backoff_multiplier": 1.5}}"#,
        )
        .unwrap();

        assert_eq!(config.session_timeout, Duration::from_secs(300));
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        // defaults fill the rest
        assert_eq!(config.capabilities, vec!["core".to_string()]);
    }

    #[test]
    fn session_config_inherits_runtime_settings() {
        let runtime = RuntimeConfig {
            capabilities: vec!["page".to_string()],
            call_timeout: Duration::from_secs(5),
            ..RuntimeConfig::default()
        };

        let session = runtime.session_config();
        assert_eq!(session.capabilities, vec!["page".to_string()]);
        assert_eq!(session.call_timeout, Duration::from_secs(5));
    }
}
