//! Controller and provider configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::fmt;
use std::time::Duration;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on waiting for a clone to become usable.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on waiting for a stopped guest to go down.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("poll interval {interval:?} exceeds {field} {timeout:?}")]
    IntervalExceedsTimeout {
        field: &'static str,
        interval: Duration,
        timeout: Duration,
    },

    #[error("hypervisor host is required")]
    MissingHost,

    #[error("invalid hypervisor host '{0}': expected an http(s) URL")]
    InvalidHost(String),

    #[error("hypervisor username is required")]
    MissingUsername,
}

/// Timing of the poll loops used by the controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Interval between status polls (default: 1s).
    pub poll_interval: Duration,
    /// Maximum wait for a clone to become usable (default: 120s).
    pub clone_timeout: Duration,
    /// Maximum wait for a guest to stop (default: 120s).
    pub stop_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Create a new config builder.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PVESYNC_POLL_INTERVAL_MS` | `1000` |
    /// | `PVESYNC_CLONE_TIMEOUT_SECS` | `120` |
    /// | `PVESYNC_STOP_TIMEOUT_SECS` | `120` |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            poll_interval: env_parse("PVESYNC_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.poll_interval),
            clone_timeout: env_parse("PVESYNC_CLONE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.clone_timeout),
            stop_timeout: env_parse("PVESYNC_STOP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.stop_timeout),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval"));
        }
        for (field, timeout) in [
            ("clone_timeout", self.clone_timeout),
            ("stop_timeout", self.stop_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroDuration(field));
            }
            if self.poll_interval > timeout {
                return Err(ConfigError::IntervalExceedsTimeout {
                    field,
                    interval: self.poll_interval,
                    timeout,
                });
            }
        }
        Ok(())
    }
}

fn env_parse(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for ControllerConfig.
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Set the interval between status polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the maximum wait for a clone to become usable.
    pub fn clone_timeout(mut self, timeout: Duration) -> Self {
        self.config.clone_timeout = timeout;
        self
    }

    /// Set the maximum wait for a guest to stop.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout = timeout;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<ControllerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connection settings a host uses to construct its hypervisor client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API base URL, e.g. `https://pve1.example.com:8006`
    pub host: String,
    /// User including realm, e.g. `root@pam`
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Load connection settings from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PVESYNC_HOST` | empty |
    /// | `PVESYNC_USERNAME` | empty |
    /// | `PVESYNC_PASSWORD` | empty |
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PVESYNC_HOST").unwrap_or_default(),
            username: std::env::var("PVESYNC_USERNAME").unwrap_or_default(),
            password: std::env::var("PVESYNC_PASSWORD").unwrap_or_default(),
        }
    }

    /// Validate the connection settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        tracing::info!(host = %self.host, username = %self.username, "Hypervisor client configured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.clone_timeout, Duration::from_secs(120));
        assert_eq!(config.stop_timeout, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        let result = ControllerConfig::builder()
            .poll_interval(Duration::ZERO)
            .build();
        assert_eq!(result, Err(ConfigError::ZeroDuration("poll_interval")));

        let result = ControllerConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .stop_timeout(Duration::from_secs(5))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::IntervalExceedsTimeout { field: "stop_timeout", .. })
        ));
    }

    #[test]
    fn test_builder_success() {
        let config = ControllerConfig::builder()
            .poll_interval(Duration::from_millis(250))
            .clone_timeout(Duration::from_secs(30))
            .stop_timeout(Duration::from_secs(45))
            .build()
            .expect("should build successfully");

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.clone_timeout, Duration::from_secs(30));
        assert_eq!(config.stop_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_from_env_uses_defaults() {
        std::env::remove_var("PVESYNC_POLL_INTERVAL_MS");
        std::env::remove_var("PVESYNC_CLONE_TIMEOUT_SECS");
        std::env::remove_var("PVESYNC_STOP_TIMEOUT_SECS");

        assert_eq!(ControllerConfig::from_env(), ControllerConfig::default());
    }

    #[test]
    fn test_provider_validation() {
        assert_eq!(
            ProviderConfig::default().validate(),
            Err(ConfigError::MissingHost)
        );
        assert_eq!(
            ProviderConfig::new("pve1:8006", "root@pam", "secret").validate(),
            Err(ConfigError::InvalidHost("pve1:8006".into()))
        );
        assert_eq!(
            ProviderConfig::new("https://pve1:8006", "", "secret").validate(),
            Err(ConfigError::MissingUsername)
        );
        assert!(ProviderConfig::new("https://pve1:8006", "root@pam", "secret")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_provider_debug_redacts_password() {
        let config = ProviderConfig::new("https://pve1:8006", "root@pam", "hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("root@pam"));
        assert!(!debug.contains("hunter2"));
    }
}
