//! Error types for token acquisition and lifecycle management.

use thiserror::Error;

/// Failure of a single round trip to the token endpoint.
///
/// Timeouts and connection failures share the [`Network`](ExchangeError::Network)
/// kind with other transport errors; only the message tells them apart.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The identity provider answered with a non-success status.
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (timeout, DNS, refused connection).
    #[error("network error: {message}")]
    Network { message: String },

    /// The provider answered 2xx but the body is not a usable token response.
    #[error("invalid token response: {message}")]
    InvalidResponse { message: String },

    /// The request could not be built from the configuration.
    #[error("cannot build token request: {message}")]
    Configuration { message: String },
}

impl ExchangeError {
    /// HTTP status returned by the provider, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        Self::Network { message }
    }
}

/// Error type for token manager operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// A required configuration value is absent or empty.
    #[error("missing configuration: {field}")]
    MissingConfiguration { field: &'static str },

    /// A configuration value is present but unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Exchanging client credentials for a token failed.
    #[error("token exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
}
