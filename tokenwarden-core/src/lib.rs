//! # Tokenwarden Core
//!
//! Client-credentials token lifecycle management.
//!
//! This crate provides:
//! - [`Credential`] - An immutable bearer token with expiry metadata
//! - [`Exchanger`] / [`HttpExchanger`] - One round trip to the token endpoint
//! - [`TokenManager`] - Cached, single-flight token access with optional
//!   background refresh
//! - [`ManagerRegistry`] - Shares one manager between unrelated call sites
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tokenwarden_core::{AuthConfig, global};
//!
//! async fn call_api(client: &reqwest::Client) -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = global::get_manager(AuthConfig::from_env()?).await?;
//!     let headers = manager.headers().await?;
//!     // attach headers to the outgoing request
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod exchange;
pub mod global;
pub mod registry;
pub mod secret;
pub mod token_manager;

mod refresh;

// Re-export commonly used types at crate root
pub use config::AuthConfig;

pub use credential::Credential;

pub use error::{ExchangeError, TokenError};

pub use exchange::{Exchanger, HttpExchanger, TokenResponse};

pub use registry::ManagerRegistry;

pub use secret::Secret;

pub use token_manager::{TokenInfo, TokenManager, TokenStatus};
