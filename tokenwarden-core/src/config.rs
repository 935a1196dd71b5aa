//! Token manager configuration.
//!
//! [`AuthConfig`] can be built in code, deserialized from TOML/JSON, or read
//! from `TOKENWARDEN_*` environment variables. Required values are checked by
//! [`AuthConfig::validate`] before any manager is constructed.

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::TokenError;
use crate::secret::Secret;

/// Default lead time before hard expiry at which a token is renewed.
pub const DEFAULT_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Default interval between background refresh checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default timeout for one token endpoint round trip.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default bound on how long `stop()` waits for the refresh task.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;

/// Scope requested with the client-credentials grant.
pub const DEFAULT_SCOPE: &str = "all-apis";

/// Path of the token endpoint relative to the identity provider host.
pub const TOKEN_ENDPOINT_PATH: &str = "oidc/v1/token";

pub const ENV_HOST: &str = "TOKENWARDEN_HOST";
pub const ENV_CLIENT_ID: &str = "TOKENWARDEN_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TOKENWARDEN_CLIENT_SECRET";
pub const ENV_AUTO_REFRESH: &str = "TOKENWARDEN_AUTO_REFRESH";
pub const ENV_REFRESH_BUFFER_MINUTES: &str = "TOKENWARDEN_REFRESH_BUFFER_MINUTES";

/// Configuration for a [`TokenManager`](crate::TokenManager).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Identity provider host, with or without an `https://` scheme.
    #[serde(default)]
    pub host: String,

    /// OAuth client ID of the service principal.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret of the service principal.
    #[serde(default)]
    pub client_secret: Secret,

    /// Whether to run the background refresh task.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,

    /// Minutes before expiry at which a token is considered due for renewal.
    #[serde(default = "default_refresh_buffer_minutes")]
    pub refresh_buffer_minutes: i64,

    /// Seconds between background refresh checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout for a single token endpoint request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long `stop()` waits for the refresh task to exit, in seconds.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// OAuth scope requested from the provider.
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_auto_refresh() -> bool {
    true
}

fn default_refresh_buffer_minutes() -> i64 {
    DEFAULT_REFRESH_BUFFER_MINUTES
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            client_id: String::new(),
            client_secret: Secret::default(),
            auto_refresh: default_auto_refresh(),
            refresh_buffer_minutes: default_refresh_buffer_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            scope: default_scope(),
        }
    }
}

impl AuthConfig {
    /// Create a configuration with the required values and defaults elsewhere.
    pub fn new(
        host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
    ) -> Self {
        Self {
            host: host.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn with_refresh_buffer_minutes(mut self, minutes: i64) -> Self {
        self.refresh_buffer_minutes = minutes;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Build a configuration purely from `TOKENWARDEN_*` environment variables.
    ///
    /// Missing required variables are not an error here; they surface as
    /// [`TokenError::MissingConfiguration`] from [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, TokenError> {
        Self::default().apply_env()
    }

    /// Override fields with any `TOKENWARDEN_*` variables that are set.
    pub fn apply_env(self) -> Result<Self, TokenError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, TokenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = client_id;
        }
        if let Some(client_secret) = lookup(ENV_CLIENT_SECRET) {
            self.client_secret = Secret::new(client_secret);
        }
        if let Some(value) = lookup(ENV_AUTO_REFRESH) {
            self.auto_refresh = parse_bool(&value).ok_or_else(|| {
                TokenError::InvalidConfiguration {
                    message: format!("{} must be a boolean, got {:?}", ENV_AUTO_REFRESH, value),
                }
            })?;
        }
        if let Some(value) = lookup(ENV_REFRESH_BUFFER_MINUTES) {
            self.refresh_buffer_minutes =
                value
                    .trim()
                    .parse()
                    .map_err(|e| TokenError::InvalidConfiguration {
                        message: format!("{} must be an integer: {}", ENV_REFRESH_BUFFER_MINUTES, e),
                    })?;
        }
        Ok(self)
    }

    /// Check that the configuration can back a token manager.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.host.trim().is_empty() {
            return Err(TokenError::MissingConfiguration { field: "host" });
        }
        if self.client_id.trim().is_empty() {
            return Err(TokenError::MissingConfiguration { field: "client_id" });
        }
        if self.client_secret.is_empty() {
            return Err(TokenError::MissingConfiguration {
                field: "client_secret",
            });
        }
        if self.refresh_buffer_minutes < 0 {
            return Err(TokenError::InvalidConfiguration {
                message: format!(
                    "refresh_buffer_minutes must not be negative, got {}",
                    self.refresh_buffer_minutes
                ),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(TokenError::InvalidConfiguration {
                message: "poll_interval_secs must be greater than zero".to_string(),
            });
        }
        self.token_endpoint()?;

        if self.auto_refresh
            && (self.refresh_buffer_minutes as u64).saturating_mul(60) <= self.poll_interval_secs
        {
            tracing::warn!(
                refresh_buffer_minutes = self.refresh_buffer_minutes,
                poll_interval_secs = self.poll_interval_secs,
                "refresh buffer does not exceed poll interval; tokens may expire before background renewal"
            );
        }

        Ok(())
    }

    /// Full URL of the provider's token endpoint.
    pub fn token_endpoint(&self) -> Result<Url, TokenError> {
        let host = self.host.trim().trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Url::parse(&format!("{}/{}", base, TOKEN_ENDPOINT_PATH)).map_err(|e| {
            TokenError::InvalidConfiguration {
                message: format!("invalid host {:?}: {}", self.host, e),
            }
        })
    }

    /// The refresh buffer, saturating at [`chrono::Duration::MAX`].
    pub fn refresh_buffer(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.refresh_buffer_minutes).unwrap_or(chrono::Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
