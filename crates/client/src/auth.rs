//! Credential store and reactive token refresh.
//!
//! Tokens live in persistent storage and are read at connect time. When the
//! hub rejects a handshake with a 401-equivalent error, [`TokenRefresher`]
//! exchanges the refresh token for a new pair; if that fails, every stored
//! credential is wiped (forced logout) before the error propagates. The
//! same wipe-and-fail policy applies when no refresh token exists.

use std::sync::Arc;

use hubline_shared::{HubError, RefreshTokenResponse, StoredUser, TokenPair};

use crate::storage::{self, KeyValueStorage};

/// Storage keys for the auth session.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
}

/// Typed facade over the persisted auth session.
///
/// Cloning is cheap; all clones share the same backing storage. Multiple
/// call sites (REST interceptor, hub refresh coordinator) may write
/// concurrently; both only ever write strictly newer token pairs, so
/// last-write-wins is sufficient.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<dyn KeyValueStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { inner: storage }
    }

    pub fn access_token(&self) -> Option<String> {
        storage::load_str(self.inner.as_ref(), keys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        storage::load_str(self.inner.as_ref(), keys::REFRESH_TOKEN)
    }

    /// Persist a freshly issued token pair.
    pub fn save_tokens(&self, tokens: &TokenPair) {
        storage::save_str(self.inner.as_ref(), keys::ACCESS_TOKEN, &tokens.access_token);
        storage::save_str(
            self.inner.as_ref(),
            keys::REFRESH_TOKEN,
            &tokens.refresh_token,
        );
    }

    pub fn stored_user(&self) -> Option<StoredUser> {
        storage::load(self.inner.as_ref(), keys::USER)
    }

    pub fn save_user(&self, user: &StoredUser) {
        storage::save(self.inner.as_ref(), keys::USER, user);
    }

    /// Wipe the whole session: access token, refresh token, cached user.
    pub fn clear(&self) {
        storage::remove(self.inner.as_ref(), keys::ACCESS_TOKEN);
        storage::remove(self.inner.as_ref(), keys::REFRESH_TOKEN);
        storage::remove(self.inner.as_ref(), keys::USER);
    }
}

/// Exchanges the current token pair for a new one at
/// `POST {base_url}Users/refresh-token`.
#[derive(Clone)]
pub struct TokenRefresher {
    http: reqwest::Client,
    base_url: String,
    store: CredentialStore,
}

impl TokenRefresher {
    /// `base_url` is the REST base, e.g. `https://api.example.com/api/`.
    pub fn new(base_url: impl Into<String>, store: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            store,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}Users/refresh-token", self.base_url)
    }

    /// Refresh the token pair and persist it.
    ///
    /// Returns the new access token. Every failure path clears the stored
    /// credentials and yields [`HubError::Authentication`].
    pub async fn refresh(&self) -> Result<String, HubError> {
        let (Some(access), Some(refresh)) =
            (self.store.access_token(), self.store.refresh_token())
        else {
            tracing::warn!("token refresh requested with no stored tokens");
            self.store.clear();
            return Err(HubError::Authentication(
                "no refresh token available".to_string(),
            ));
        };

        let body = TokenPair {
            access_token: access.clone(),
            refresh_token: refresh,
        };

        let result = self
            .http
            .post(self.endpoint())
            .bearer_auth(&access)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("token refresh request failed: {e}");
                self.store.clear();
                return Err(HubError::Authentication(format!(
                    "token refresh failed: {e}"
                )));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::error!("token refresh rejected with HTTP {status}");
            self.store.clear();
            return Err(HubError::Authentication(format!(
                "token refresh rejected with status {status}"
            )));
        }

        let parsed: RefreshTokenResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                self.store.clear();
                return Err(HubError::Authentication(format!(
                    "malformed refresh response: {e}"
                )));
            }
        };

        self.store.save_tokens(&parsed.data);
        tracing::info!("token refresh succeeded");
        Ok(parsed.data.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn tokens_round_trip() {
        let creds = store();
        creds.save_tokens(&TokenPair {
            access_token: "a-1".into(),
            refresh_token: "r-1".into(),
        });
        assert_eq!(creds.access_token().as_deref(), Some("a-1"));
        assert_eq!(creds.refresh_token().as_deref(), Some("r-1"));
    }

    #[test]
    fn clear_wipes_the_whole_session() {
        let creds = store();
        creds.save_tokens(&TokenPair {
            access_token: "a-1".into(),
            refresh_token: "r-1".into(),
        });
        creds.save_user(&StoredUser {
            id: "u-1".into(),
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            email: None,
        });

        creds.clear();

        assert!(creds.access_token().is_none());
        assert!(creds.refresh_token().is_none());
        assert!(creds.stored_user().is_none());
    }

    #[tokio::test]
    async fn refresh_without_tokens_fails_closed() {
        let creds = store();
        creds.save_user(&StoredUser {
            id: "u-1".into(),
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            email: None,
        });
        let refresher = TokenRefresher::new("http://127.0.0.1:1/api/", creds.clone());

        let err = refresher.refresh().await.unwrap_err();
        assert!(err.is_auth());
        // The cached user goes too: forced logout.
        assert!(creds.stored_user().is_none());
    }
}
