//! Process-wide token manager.
//!
//! Thin wrappers over one lazily created [`ManagerRegistry`]. Code that can
//! own its registry (tests, embedded use) should do so instead.

use std::sync::{Arc, OnceLock};

use crate::config::AuthConfig;
use crate::error::TokenError;
use crate::registry::ManagerRegistry;
use crate::token_manager::TokenManager;

static REGISTRY: OnceLock<ManagerRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static ManagerRegistry {
    REGISTRY.get_or_init(ManagerRegistry::new)
}

/// Get the process-wide manager, creating it from `config` on first use.
pub async fn get_manager(config: AuthConfig) -> Result<Arc<TokenManager>, TokenError> {
    registry().get_manager(config).await
}

/// Get the process-wide manager, creating it from `TOKENWARDEN_*` variables
/// on first use.
pub async fn get_manager_from_env() -> Result<Arc<TokenManager>, TokenError> {
    if let Some(manager) = registry().current().await {
        return Ok(manager);
    }
    registry().get_manager(AuthConfig::from_env()?).await
}

/// Stop and clear the process-wide manager.
pub async fn stop_manager() {
    registry().stop_manager().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    #[tokio::test]
    async fn test_process_wide_manager_is_reused() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "process-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = AuthConfig::new(mock_server.uri(), "client-id", "client-secret")
            .with_auto_refresh(false);
        let manager = get_manager(config).await.unwrap();

        // An existing manager is returned before the environment is consulted.
        let from_env = get_manager_from_env().await.unwrap();
        assert!(Arc::ptr_eq(&manager, &from_env));
        assert!(Arc::ptr_eq(&manager, &registry().current().await.unwrap()));
        assert_eq!(from_env.get_token(false).await.unwrap(), "process-token");

        stop_manager().await;
        assert!(registry().current().await.is_none());
    }
}
