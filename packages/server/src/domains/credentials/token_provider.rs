//! Supplies usable access tokens, refreshing ahead of expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::models::Credential;
use crate::kernel::timeout::with_timeout;
use crate::kernel::traits::{BaseCredentialStore, BaseTokenEndpoint};

/// An access token cleared for use until `expires_at`.
#[derive(Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub account_id: Option<String>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .finish()
    }
}

impl From<&Credential> for AccessToken {
    fn from(cred: &Credential) -> Self {
        Self {
            access_token: cred.access_token.clone(),
            expires_at: cred.expires_at,
            account_id: cred.account_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TokenOutcome {
    /// Stored token has plenty of life left
    Valid(AccessToken),
    /// Refreshed just now and persisted
    Refreshed(AccessToken),
    /// Refresh failed (now or earlier) but the old token has not expired yet
    StaleFallback { token: AccessToken, error: String },
    /// No usable token; the tenant has to reconnect
    Unavailable { reason: String },
}

impl TokenOutcome {
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            TokenOutcome::Valid(token)
            | TokenOutcome::Refreshed(token)
            | TokenOutcome::StaleFallback { token, .. } => Some(token),
            TokenOutcome::Unavailable { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TokenOutcome::Valid(_) => "valid",
            TokenOutcome::Refreshed(_) => "refreshed",
            TokenOutcome::StaleFallback { .. } => "stale_fallback",
            TokenOutcome::Unavailable { .. } => "unavailable",
        }
    }
}

/// Token provider. Refreshes are not serialized; concurrent refreshes for the
/// same tenant race and the last write wins.
pub struct TokenProvider {
    store: Arc<dyn BaseCredentialStore>,
    endpoint: Arc<dyn BaseTokenEndpoint>,
    refresh_buffer: chrono::Duration,
    call_timeout: Duration,
}

impl TokenProvider {
    pub fn new(
        store: Arc<dyn BaseCredentialStore>,
        endpoint: Arc<dyn BaseTokenEndpoint>,
        refresh_buffer: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            endpoint,
            refresh_buffer: chrono::Duration::from_std(refresh_buffer)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            call_timeout,
        }
    }

    pub async fn get_valid_token(&self, tenant_id: &str) -> TokenOutcome {
        self.get_valid_token_at(tenant_id, Utc::now()).await
    }

    pub async fn get_valid_token_at(&self, tenant_id: &str, now: DateTime<Utc>) -> TokenOutcome {
        let credential = match self.store.find_credential(tenant_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                return TokenOutcome::Unavailable {
                    reason: "no Google credential; reconnect required".to_string(),
                }
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "Failed to load credential");
                return TokenOutcome::Unavailable {
                    reason: format!("credential could not be loaded: {e}"),
                };
            }
        };

        if credential.invalid {
            let error = credential
                .last_error
                .clone()
                .unwrap_or_else(|| "credential marked invalid".to_string());
            return fallback(&credential, error, now);
        }

        if credential.expires_at - now > self.refresh_buffer {
            return TokenOutcome::Valid(AccessToken::from(&credential));
        }

        debug!(tenant_id, expires_at = %credential.expires_at, "Access token near expiry, refreshing");
        match self.refresh(&credential, now).await {
            Ok(token) => TokenOutcome::Refreshed(token),
            Err(error) => {
                warn!(tenant_id, error = %error, "Token refresh failed, marking credential invalid");
                if let Err(e) = self.store.mark_credential_invalid(tenant_id, &error).await {
                    warn!(tenant_id, error = %e, "Failed to mark credential invalid");
                }
                fallback(&credential, error, now)
            }
        }
    }

    async fn refresh(&self, credential: &Credential, now: DateTime<Utc>) -> Result<AccessToken, String> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "no refresh token stored".to_string())?;

        let refreshed = with_timeout(
            self.call_timeout,
            "token refresh",
            self.endpoint.refresh(refresh_token),
        )
        .await
        .map_err(|e| e.to_string())?;

        if let Err(e) = self
            .store
            .save_refreshed_credential(&credential.tenant_id, &refreshed, now)
            .await
        {
            // The token is still good for this call; the next call refreshes again
            warn!(tenant_id = %credential.tenant_id, error = %e, "Failed to persist refreshed token");
        }

        info!(
            tenant_id = %credential.tenant_id,
            expires_at = %refreshed.expires_at,
            rotated = refreshed.refresh_token.is_some(),
            "Access token refreshed"
        );

        Ok(AccessToken {
            access_token: refreshed.access_token,
            expires_at: refreshed.expires_at,
            account_id: credential.account_id.clone(),
        })
    }
}

/// Old token while it is still technically valid, otherwise nothing.
fn fallback(credential: &Credential, error: String, now: DateTime<Utc>) -> TokenOutcome {
    if credential.is_expired_at(now) {
        TokenOutcome::Unavailable {
            reason: format!("credential expired and could not be refreshed: {error}"),
        }
    } else {
        TokenOutcome::StaleFallback {
            token: AccessToken::from(credential),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MemoryStore, MockTokenEndpoint};
    use chrono::Duration as ChronoDuration;

    fn provider(store: &Arc<MemoryStore>, endpoint: &Arc<MockTokenEndpoint>) -> TokenProvider {
        TokenProvider::new(
            store.clone(),
            endpoint.clone(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn token_expiring_soon_is_refreshed_first() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "old", "refresh-1", now + ChronoDuration::minutes(10)));
        let endpoint = Arc::new(MockTokenEndpoint::new().with_token("new-token", 3600));

        let outcome = provider(&store, &endpoint).get_valid_token_at("t1", now).await;

        let TokenOutcome::Refreshed(token) = outcome else {
            panic!("expected refresh, got {}", outcome.label());
        };
        assert_eq!(token.access_token, "new-token");
        assert_eq!(endpoint.calls(), vec!["refresh-1".to_string()]);
        let saved = store.credential("t1").unwrap();
        assert_eq!(saved.access_token, "new-token");
        assert!(!saved.invalid);
    }

    #[tokio::test]
    async fn token_with_hours_left_is_not_refreshed() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "current", "r", now + ChronoDuration::hours(2)));
        let endpoint = Arc::new(MockTokenEndpoint::new());

        let outcome = provider(&store, &endpoint).get_valid_token_at("t1", now).await;

        assert!(matches!(outcome, TokenOutcome::Valid(ref t) if t.access_token == "current"));
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_stored() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "old", "r-old", now + ChronoDuration::minutes(1)));
        let endpoint = Arc::new(MockTokenEndpoint::new().with_rotated_token("new", "r-new"));

        provider(&store, &endpoint).get_valid_token_at("t1", now).await;

        assert_eq!(store.credential("t1").unwrap().refresh_token.as_deref(), Some("r-new"));
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_and_marks_invalid() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "old", "r", now + ChronoDuration::minutes(5)));
        let endpoint = Arc::new(MockTokenEndpoint::new().with_failure("invalid_grant"));
        let provider = provider(&store, &endpoint);

        let outcome = provider.get_valid_token_at("t1", now).await;
        assert!(matches!(outcome, TokenOutcome::StaleFallback { ref token, .. } if token.access_token == "old"));
        assert!(store.credential("t1").unwrap().invalid);

        // Already invalid: no second endpoint call
        let again = provider.get_valid_token_at("t1", now).await;
        assert!(matches!(again, TokenOutcome::StaleFallback { .. }));
        assert_eq!(endpoint.calls().len(), 1);

        // Past expiry the stale token is no longer offered
        let later = provider
            .get_valid_token_at("t1", now + ChronoDuration::minutes(6))
            .await;
        assert!(matches!(later, TokenOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn expired_token_with_failed_refresh_is_unavailable() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "old", "r", now - ChronoDuration::minutes(1)));
        let endpoint = Arc::new(MockTokenEndpoint::new().with_failure("invalid_grant"));

        let outcome = provider(&store, &endpoint).get_valid_token_at("t1", now).await;

        assert!(outcome.token().is_none());
    }

    #[tokio::test]
    async fn missing_credential_is_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(MockTokenEndpoint::new());

        let outcome = provider(&store, &endpoint).get_valid_token("nobody").await;

        assert!(matches!(outcome, TokenOutcome::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_endpoint_counts_as_failure() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_credential(Credential::new("t1", "old", "r", now + ChronoDuration::minutes(5)));
        let endpoint = Arc::new(
            MockTokenEndpoint::new()
                .with_token("new", 3600)
                .with_delay(std::time::Duration::from_secs(60)),
        );

        let outcome = provider(&store, &endpoint).get_valid_token_at("t1", now).await;

        assert!(matches!(outcome, TokenOutcome::StaleFallback { .. }));
        assert!(store.credential("t1").unwrap().invalid);
    }
}
