//! Shared token manager lifecycle.
//!
//! A [`ManagerRegistry`] lazily builds one [`TokenManager`] and hands the same
//! instance to every caller, so unrelated call sites share one credential
//! cache and one background refresh task. The registry is an ordinary value;
//! [`crate::global`] wraps a process-wide instance for callers that want one.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AuthConfig;
use crate::error::TokenError;
use crate::exchange::Exchanger;
use crate::token_manager::TokenManager;

/// Holder of at most one live [`TokenManager`].
pub struct ManagerRegistry {
    current: Mutex<Option<Arc<TokenManager>>>,
    exchanger: Option<Arc<dyn Exchanger>>,
}

impl ManagerRegistry {
    /// Create an empty registry whose managers exchange over HTTP.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            exchanger: None,
        }
    }

    /// Create an empty registry whose managers use the given [`Exchanger`].
    pub fn with_exchanger(exchanger: Arc<dyn Exchanger>) -> Self {
        Self {
            current: Mutex::new(None),
            exchanger: Some(exchanger),
        }
    }

    /// Return the live manager, building and starting one if none exists.
    ///
    /// The first successful caller's configuration wins; later calls get the
    /// existing instance and their `config` is ignored. If building fails,
    /// nothing is stored and the next call tries again.
    pub async fn get_manager(&self, config: AuthConfig) -> Result<Arc<TokenManager>, TokenError> {
        let mut current = self.current.lock().await;

        if let Some(manager) = current.as_ref() {
            tracing::debug!("returning existing token manager");
            return Ok(Arc::clone(manager));
        }

        let manager = match &self.exchanger {
            Some(exchanger) => {
                TokenManager::start_with_exchanger(config, Arc::clone(exchanger)).await?
            }
            None => TokenManager::start(config).await?,
        };
        let manager = Arc::new(manager);
        *current = Some(Arc::clone(&manager));

        tracing::info!("token manager registered");
        Ok(manager)
    }

    /// Return the live manager without building one.
    pub async fn current(&self) -> Option<Arc<TokenManager>> {
        self.current.lock().await.clone()
    }

    /// Stop the live manager, if any, and forget it.
    ///
    /// The next [`get_manager`](Self::get_manager) builds a fresh instance
    /// from its own configuration.
    pub async fn stop_manager(&self) {
        let mut current = self.current.lock().await;
        if let Some(manager) = current.take() {
            manager.stop().await;
            tracing::info!("token manager stopped and cleared");
        }
    }
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = self.current.try_lock().map(|c| c.is_some()).ok();
        f.debug_struct("ManagerRegistry")
            .field("live", &live)
            .field("custom_exchanger", &self.exchanger.is_some())
            .finish()
    }
}
