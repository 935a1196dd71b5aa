//! The cached bearer credential.
//!
//! A [`Credential`] is built once per successful exchange and never mutated
//! afterwards. The manager swaps whole `Arc<Credential>` values rather than
//! editing fields in place.

use chrono::{DateTime, Duration, Utc};

use crate::secret::Secret;

/// Token type assumed when the provider omits `token_type`.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// An immutable bearer token with its expiry metadata.
#[derive(Debug, Clone)]
pub struct Credential {
    token: Secret,
    expires_at: DateTime<Utc>,
    token_type: String,
    scope: Option<String>,
}

impl Credential {
    /// Create a credential expiring at an absolute instant.
    pub fn new(token: impl Into<Secret>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            scope: None,
        }
    }

    /// Create a credential from a provider's relative `expires_in`, stamped
    /// against the current time.
    ///
    /// A lifetime past the representable range saturates at
    /// [`DateTime::<Utc>::MAX_UTC`]; use [`expiry_after`] to detect it.
    pub fn expiring_in(token: impl Into<Secret>, expires_in_secs: i64) -> Self {
        let expires_at = expiry_after(Utc::now(), expires_in_secs).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(token, expires_at)
    }

    /// Set the token type (usually "Bearer").
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Set the granted scope.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn token(&self) -> &Secret {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Value for an `Authorization` header: `"<token_type> <token>"`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.token.expose())
    }

    /// Check if this credential has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whole seconds left before hard expiry, clamped at zero.
    pub fn seconds_until_expiry(&self) -> i64 {
        self.seconds_until_expiry_at(Utc::now())
    }

    pub fn seconds_until_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Check if this credential is inside its refresh window.
    ///
    /// True once `now >= expires_at - buffer`. A zero buffer degrades to the
    /// hard expiry check.
    pub fn needs_refresh(&self, buffer: Duration) -> bool {
        self.needs_refresh_at(Utc::now(), buffer)
    }

    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        // A buffer reaching before the earliest instant covers all of time.
        self.expires_at
            .checked_sub_signed(buffer)
            .is_none_or(|window_start| now >= window_start)
    }
}

/// `now + secs`, or `None` when the result leaves chrono's range.
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}
