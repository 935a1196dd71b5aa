//! Cached, single-flight token manager.
//!
//! This module provides [`TokenManager`], which owns the current
//! [`Credential`], decides when it must be replaced, and serializes
//! replacement across any number of concurrent callers.
//!
//! # Features
//!
//! - Proactive renewal a configurable buffer before hard expiry
//! - Single-flight exchange: racing callers wait for one in-flight exchange
//!   instead of each calling the token endpoint
//! - Optional background task that renews tokens before callers ask
//! - Last-known credential survives failed refresh attempts
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tokenwarden_core::TokenError> {
//! use tokenwarden_core::{AuthConfig, TokenManager};
//!
//! let config = AuthConfig::new("example.cloud.provider.net", "client-id", "client-secret");
//! let manager = TokenManager::start(config).await?;
//!
//! let headers = manager.headers().await?;
//! println!("Authorization: {}", headers["Authorization"]);
//!
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::error::TokenError;
use crate::exchange::{Exchanger, HttpExchanger};
use crate::refresh::{self, RefreshHandle};

type CredentialSlot = Option<Arc<Credential>>;

/// Whether a manager currently holds a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    NoToken,
    Active,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::Active => "active",
        }
    }
}

/// Diagnostic snapshot of a manager's cached credential.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub status: TokenStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_remaining: i64,
    pub minutes_remaining: i64,
    pub is_expired: bool,
    pub needs_refresh: bool,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// State shared between a [`TokenManager`] and its background refresh task.
pub(crate) struct ManagerInner {
    config: AuthConfig,
    exchanger: Arc<dyn Exchanger>,
    cache: Mutex<CredentialSlot>,
}

impl ManagerInner {
    /// Return a usable credential, exchanging for a new one when forced or due.
    async fn credential(&self, force_refresh: bool) -> Result<Arc<Credential>, TokenError> {
        let mut cache = self.cache.lock().await;
        self.replace_if_needed(&mut cache, force_refresh).await
    }

    /// Renew the cached credential only if it is inside its refresh window.
    ///
    /// Returns whether an exchange was performed.
    pub(crate) async fn refresh_if_due(&self) -> Result<bool, TokenError> {
        let mut cache = self.cache.lock().await;
        if !self.is_due(&cache) {
            return Ok(false);
        }
        self.replace_if_needed(&mut cache, true).await?;
        Ok(true)
    }

    fn is_due(&self, cache: &CredentialSlot) -> bool {
        cache
            .as_ref()
            .is_none_or(|c| c.needs_refresh(self.config.refresh_buffer()))
    }

    /// The only path that calls the exchanger.
    ///
    /// Takes the held cache guard so the decision and the replacement happen
    /// in one critical section. On failure the previous credential stays.
    async fn replace_if_needed(
        &self,
        cache: &mut MutexGuard<'_, CredentialSlot>,
        force_refresh: bool,
    ) -> Result<Arc<Credential>, TokenError> {
        let slot: &mut CredentialSlot = cache;

        if !force_refresh && !self.is_due(slot) {
            if let Some(current) = slot.as_ref() {
                tracing::debug!(
                    seconds_remaining = current.seconds_until_expiry(),
                    "using cached token"
                );
                return Ok(Arc::clone(current));
            }
        }

        let reason = match slot.as_ref() {
            _ if force_refresh => "forced",
            None => "no_token",
            Some(c) if c.is_expired() => "expired",
            Some(_) => "refresh_window",
        };
        tracing::info!(reason, client_id = %self.config.client_id, "refreshing access token");

        match self.exchanger.exchange(&self.config).await {
            Ok(credential) => {
                let credential = Arc::new(credential);
                *slot = Some(Arc::clone(&credential));
                tracing::info!(
                    expires_at = %credential.expires_at().to_rfc3339(),
                    "access token refreshed"
                );
                Ok(credential)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    has_previous = slot.is_some(),
                    "token exchange failed"
                );
                Err(e.into())
            }
        }
    }

    async fn info(&self) -> TokenInfo {
        let cache = self.cache.lock().await;
        match cache.as_ref() {
            None => TokenInfo {
                status: TokenStatus::NoToken,
                expires_at: None,
                seconds_remaining: 0,
                minutes_remaining: 0,
                is_expired: true,
                needs_refresh: true,
                token_type: None,
                scope: None,
            },
            Some(credential) => {
                let now = Utc::now();
                let seconds_remaining = credential.seconds_until_expiry_at(now);
                TokenInfo {
                    status: TokenStatus::Active,
                    expires_at: Some(credential.expires_at()),
                    seconds_remaining,
                    minutes_remaining: seconds_remaining / 60,
                    is_expired: credential.is_expired_at(now),
                    needs_refresh: credential
                        .needs_refresh_at(now, self.config.refresh_buffer()),
                    token_type: Some(credential.token_type().to_string()),
                    scope: credential.scope().map(str::to_string),
                }
            }
        }
    }
}

/// Manages one client-credentials token for any number of callers.
///
/// All reads and replacements of the cached credential go through one
/// mutex, held across the exchange itself. Callers that arrive while an
/// exchange is in flight wait for it and then reuse its result.
pub struct TokenManager {
    inner: Arc<ManagerInner>,
    refresher: Option<RefreshHandle>,
}

impl TokenManager {
    /// Create a manager that talks to the configured provider over HTTP.
    ///
    /// No token is fetched and no background task is started; the first
    /// [`get_token`](Self::get_token) performs the initial exchange. Use
    /// [`start`](Self::start) for eager acquisition and auto-refresh.
    pub fn new(config: AuthConfig) -> Result<Self, TokenError> {
        config.validate()?;
        let exchanger = HttpExchanger::new(&config)?;
        Self::with_exchanger(config, Arc::new(exchanger))
    }

    /// Create a manager with a custom [`Exchanger`].
    pub fn with_exchanger(
        config: AuthConfig,
        exchanger: Arc<dyn Exchanger>,
    ) -> Result<Self, TokenError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                exchanger,
                cache: Mutex::new(None),
            }),
            refresher: None,
        })
    }

    /// Create a manager, fetch the initial token, and start auto-refresh if
    /// configured.
    ///
    /// A failed initial exchange is fatal: no manager is returned and no
    /// background task is left running.
    pub async fn start(config: AuthConfig) -> Result<Self, TokenError> {
        config.validate()?;
        let exchanger = HttpExchanger::new(&config)?;
        Self::start_with_exchanger(config, Arc::new(exchanger)).await
    }

    /// [`start`](Self::start) with a custom [`Exchanger`].
    pub async fn start_with_exchanger(
        config: AuthConfig,
        exchanger: Arc<dyn Exchanger>,
    ) -> Result<Self, TokenError> {
        let mut manager = Self::with_exchanger(config, exchanger)?;
        manager.inner.credential(false).await?;

        if manager.inner.config.auto_refresh {
            let interval = manager.inner.config.poll_interval();
            manager.refresher = Some(refresh::spawn(Arc::clone(&manager.inner), interval));
        }

        tracing::info!(
            host = %manager.inner.config.host,
            auto_refresh = manager.inner.config.auto_refresh,
            refresh_buffer_minutes = manager.inner.config.refresh_buffer_minutes,
            "token manager started"
        );
        Ok(manager)
    }

    /// Get a valid bearer token, exchanging for a new one when needed.
    ///
    /// With `force_refresh` the exchange happens even if the cached token is
    /// still fresh. Exchange failures are returned to the caller and leave
    /// the previous token cached.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String, TokenError> {
        let credential = self.inner.credential(force_refresh).await?;
        Ok(credential.token().expose().to_string())
    }

    /// Get the current credential, exchanging for a new one when needed.
    pub async fn credential(&self) -> Result<Arc<Credential>, TokenError> {
        self.inner.credential(false).await
    }

    /// Force an exchange regardless of the cached token's age.
    pub async fn refresh(&self) -> Result<(), TokenError> {
        self.inner.credential(true).await.map(|_| ())
    }

    /// `"<token_type> <token>"` for an `Authorization` header.
    pub async fn authorization_header(&self) -> Result<String, TokenError> {
        let credential = self.inner.credential(false).await?;
        Ok(credential.authorization_value())
    }

    /// Headers for a JSON API request authenticated with the current token.
    pub async fn headers(&self) -> Result<HashMap<String, String>, TokenError> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), self.authorization_header().await?);
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Ok(headers)
    }

    /// Snapshot of the cached credential. Never triggers an exchange.
    pub async fn token_info(&self) -> TokenInfo {
        self.inner.info().await
    }

    /// Stop the background refresh task, waiting up to the configured stop
    /// timeout. Safe to call repeatedly.
    pub async fn stop(&self) {
        if let Some(refresher) = &self.refresher {
            refresher.stop(self.inner.config.stop_timeout()).await;
        }
    }

    /// Whether the background refresh task is still running.
    pub async fn is_refreshing(&self) -> bool {
        match &self.refresher {
            Some(refresher) => refresher.is_running().await,
            None => false,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Swap in a credential directly, bypassing the exchanger.
    #[cfg(test)]
    pub(crate) async fn install(&self, credential: Credential) {
        *self.inner.cache.lock().await = Some(Arc::new(credential));
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("host", &self.inner.config.host)
            .field("client_id", &self.inner.config.client_id)
            .field("auto_refresh", &self.refresher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header_exists, method, path},
    };

    /// Exchanger that counts calls and hands out `tok1`, `tok2`, ...
    struct CountingExchanger {
        calls: AtomicUsize,
        expires_in: i64,
        fail: bool,
    }

    impl CountingExchanger {
        fn new(expires_in: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in: 0,
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Exchanger for CountingExchanger {
        async fn exchange(&self, _config: &AuthConfig) -> Result<Credential, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(ExchangeError::Status {
                    status: 401,
                    body: "{\"error\":\"invalid_client\"}".to_string(),
                });
            }
            Ok(Credential::expiring_in(format!("tok{}", n), self.expires_in))
        }
    }

    fn test_config() -> AuthConfig {
        AuthConfig::new("example.cloud", "client-id", "client-secret").with_auto_refresh(false)
    }

    #[tokio::test]
    async fn test_missing_configuration_makes_no_exchange() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let config = AuthConfig::new("example.cloud", "", "client-secret");

        let result = TokenManager::start_with_exchanger(config, exchanger.clone()).await;

        assert!(matches!(
            result,
            Err(TokenError::MissingConfiguration { field: "client_id" })
        ));
        assert_eq!(exchanger.calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap();

        assert_eq!(manager.get_token(false).await.unwrap(), "tok1");
        assert_eq!(manager.get_token(false).await.unwrap(), "tok1");
        assert_eq!(exchanger.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_always_exchanges() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap();

        assert_eq!(manager.get_token(false).await.unwrap(), "tok1");
        assert_eq!(manager.get_token(true).await.unwrap(), "tok2");
        assert_eq!(manager.get_token(false).await.unwrap(), "tok2");
        assert_eq!(exchanger.calls(), 2);
    }

    #[tokio::test]
    async fn test_token_inside_buffer_is_renewed() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap();

        // Expires in 3 minutes, inside the default 5-minute buffer.
        manager
            .install(Credential::expiring_in("soon-to-expire", 180))
            .await;

        assert_eq!(manager.get_token(false).await.unwrap(), "tok1");
        assert_eq!(exchanger.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_buffer_keeps_token_until_expiry() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let config = test_config().with_refresh_buffer_minutes(0);
        let manager = TokenManager::with_exchanger(config, exchanger.clone()).unwrap();

        manager.install(Credential::expiring_in("short-lived", 60)).await;

        assert_eq!(manager.get_token(false).await.unwrap(), "short-lived");
        assert_eq!(exchanger.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_credential() {
        let exchanger = Arc::new(CountingExchanger::failing());
        let manager = TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap();
        manager.install(Credential::expiring_in("stale-token", 120)).await;

        let result = manager.get_token(false).await;
        assert!(matches!(
            result,
            Err(TokenError::Exchange(ExchangeError::Status { status: 401, .. }))
        ));

        let info = manager.token_info().await;
        assert_eq!(info.status, TokenStatus::Active);
        assert!(!info.is_expired);
        assert!(info.needs_refresh);
    }

    #[tokio::test]
    async fn test_initial_exchange_failure_is_fatal() {
        let exchanger = Arc::new(CountingExchanger::failing());
        let config = test_config().with_auto_refresh(true);

        let result = TokenManager::start_with_exchanger(config, exchanger.clone()).await;

        assert!(matches!(result, Err(TokenError::Exchange(_))));
        assert_eq!(exchanger.calls(), 1);
    }

    /// Exchanger that takes a while, so concurrent callers pile up behind it.
    struct SlowExchanger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Exchanger for SlowExchanger {
        async fn exchange(&self, _config: &AuthConfig) -> Result<Credential, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(Credential::expiring_in(format!("tok{}", n), 3600))
        }
    }

    async fn race_get_token(manager: &Arc<TokenManager>, callers: usize) -> Vec<String> {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let manager = Arc::clone(manager);
                tokio::spawn(async move { manager.get_token(false).await })
            })
            .collect();

        let mut tokens = Vec::with_capacity(callers);
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }
        tokens
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let exchanger = Arc::new(SlowExchanger {
            calls: AtomicUsize::new(0),
        });
        let manager =
            Arc::new(TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap());

        let tokens = race_get_token(&manager, 16).await;

        assert!(tokens.iter().all(|t| t == "tok1"));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_on_expired_cache_share_one_exchange() {
        let exchanger = Arc::new(SlowExchanger {
            calls: AtomicUsize::new(0),
        });
        let manager =
            Arc::new(TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap());
        manager
            .install(Credential::new("expired", Utc::now() - Duration::minutes(1)))
            .await;

        let tokens = race_get_token(&manager, 16).await;

        assert!(tokens.iter().all(|t| t == "tok1"));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
        assert!(!manager.token_info().await.is_expired);
    }

    #[tokio::test]
    async fn test_headers() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::with_exchanger(test_config(), exchanger).unwrap();

        let headers = manager.headers().await.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Bearer tok1");
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_token_info_never_exchanges() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::with_exchanger(test_config(), exchanger.clone()).unwrap();

        let info = manager.token_info().await;
        assert_eq!(info.status, TokenStatus::NoToken);
        assert_eq!(info.status.as_str(), "no_token");
        assert!(info.needs_refresh);
        assert!(info.expires_at.is_none());
        assert_eq!(exchanger.calls(), 0);

        manager.get_token(false).await.unwrap();
        let info = manager.token_info().await;
        assert_eq!(info.status, TokenStatus::Active);
        assert!(!info.is_expired);
        assert!(!info.needs_refresh);
        assert!(info.seconds_remaining > 3590);
        assert_eq!(info.minutes_remaining, info.seconds_remaining / 60);
        assert_eq!(info.token_type.as_deref(), Some("Bearer"));
        assert_eq!(exchanger.calls(), 1);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "active");
    }

    #[tokio::test]
    async fn test_stop_without_refresher_is_noop() {
        let exchanger = Arc::new(CountingExchanger::new(3600));
        let manager = TokenManager::start_with_exchanger(test_config(), exchanger)
            .await
            .unwrap();

        assert!(!manager.is_refreshing().await);
        manager.stop().await;
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_end_to_end_rewound_expiry_triggers_second_exchange() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oidc/v1/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=all-apis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oidc/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = AuthConfig::new(mock_server.uri(), "client-id", "client-secret")
            .with_auto_refresh(false);
        let manager = TokenManager::start(config).await.unwrap();
        assert_eq!(manager.get_token(false).await.unwrap(), "tok1");

        // Rewind: replace the cached credential with one that already expired.
        let current = manager.credential().await.unwrap();
        manager
            .install(
                Credential::new(current.token().clone(), Utc::now() - Duration::minutes(1))
                    .with_token_type(current.token_type()),
            )
            .await;

        assert_eq!(manager.get_token(false).await.unwrap(), "tok2");
        assert_eq!(manager.get_token(false).await.unwrap(), "tok2");

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }
}
