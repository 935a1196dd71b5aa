//! Client-credentials exchange against the identity provider.
//!
//! This module provides:
//! - [`Exchanger`] - Trait for turning client credentials into a [`Credential`]
//! - [`HttpExchanger`] - The real implementation, one POST per call
//! - [`TokenResponse`] - The provider's JSON response body
//!
//! An exchange performs exactly one round trip. Retrying is the caller's job:
//! foreground callers see the error, the background task tries again on its
//! next poll.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::credential::{self, Credential, DEFAULT_TOKEN_TYPE};
use crate::error::{ExchangeError, TokenError};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a credential stamped against the current time.
    pub fn into_credential(self) -> Result<Credential, ExchangeError> {
        if self.access_token.is_empty() {
            return Err(ExchangeError::InvalidResponse {
                message: "response does not contain access_token".to_string(),
            });
        }

        let expires_in = match self.expires_in {
            Some(secs) if secs > 0 => secs,
            Some(secs) => {
                tracing::warn!(expires_in = secs, "provider sent non-positive expires_in, using default");
                DEFAULT_EXPIRES_IN_SECS
            }
            None => DEFAULT_EXPIRES_IN_SECS,
        };

        let expires_at = credential::expiry_after(chrono::Utc::now(), expires_in).ok_or_else(|| {
            ExchangeError::InvalidResponse {
                message: format!("expires_in out of range: {}", expires_in),
            }
        })?;

        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

        Ok(Credential::new(self.access_token, expires_at)
            .with_token_type(token_type)
            .with_scope(self.scope))
    }
}

/// Trait for obtaining a fresh credential from the identity provider.
///
/// [`TokenManager`](crate::TokenManager) calls this only while holding its
/// cache lock, so implementations never see concurrent calls from the same
/// manager.
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Exchange the configured client ID and secret for a new credential.
    async fn exchange(&self, config: &AuthConfig) -> Result<Credential, ExchangeError>;
}

/// [`Exchanger`] backed by an HTTP POST to `<host>/oidc/v1/token`.
#[derive(Debug, Clone)]
pub struct HttpExchanger {
    http_client: reqwest::Client,
}

impl HttpExchanger {
    /// Create an exchanger whose requests time out after `config.request_timeout()`.
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TokenError::InvalidConfiguration {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }

    /// Create an exchanger around an existing client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Exchanger for HttpExchanger {
    async fn exchange(&self, config: &AuthConfig) -> Result<Credential, ExchangeError> {
        let url = config
            .token_endpoint()
            .map_err(|e| ExchangeError::Configuration {
                message: e.to_string(),
            })?;

        tracing::debug!(
            url = %url,
            client_id = %config.client_id,
            "requesting client-credentials token"
        );

        let response = self
            .http_client
            .post(url)
            .basic_auth(&config.client_id, Some(config.client_secret.expose()))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", config.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            tracing::error!(status = status.as_u16(), body = %body, "token endpoint rejected exchange");
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ExchangeError::InvalidResponse {
                message: e.to_string(),
            })?;

        let credential = token_response.into_credential()?;

        tracing::info!(
            expires_at = %credential.expires_at().to_rfc3339(),
            "obtained client-credentials token"
        );

        Ok(credential)
    }
}
