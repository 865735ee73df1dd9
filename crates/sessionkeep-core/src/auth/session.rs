//! The session context: one authenticated-user state machine per app
//! instance.
//!
//! ```text
//! SignedOut --sign_in--> SigningIn --ok--> Authenticated(user)
//!                                  --err-> SignedOut
//! Authenticated --sign_out--> SignedOut
//! Authenticated --401 + failed refresh--> Expired --> SignedOut
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::{CredentialStore, RefreshCoordinator, SessionStateHandle, StorageError, TokenCell};
use crate::api::{ApiClient, ApiError, AuthApi, USERS_PATH};
use crate::config::Config;
use crate::models::{ProfileUpdate, SessionState, User};

pub struct Session {
    api: AuthApi,
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    tokens: TokenCell,
    refresh: Arc<RefreshCoordinator>,
    state: SessionStateHandle,
    loading: AtomicBool,
}

impl Session {
    /// Build a session that has not yet read the credential store.
    ///
    /// `is_loading_user_storage_data` stays true until [`Session::restore`].
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let tokens = TokenCell::default();
        let state = SessionStateHandle::new(SessionState::SignedOut);
        let api = AuthApi::new(http.clone(), config.base_url.as_str());
        let refresh = Arc::new(RefreshCoordinator::new(
            api.clone(),
            store.clone(),
            tokens.clone(),
            state.clone(),
        ));
        let client = ApiClient::new(http, config.base_url.as_str(), tokens.clone(), refresh.clone());

        Ok(Self {
            api,
            client,
            store,
            tokens,
            refresh,
            state,
            loading: AtomicBool::new(true),
        })
    }

    /// Build a session and rehydrate it from the credential store.
    pub fn launch(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let session = Self::new(config, store)?;
        session.restore();
        Ok(session)
    }

    /// Rehydrate from the credential store.
    ///
    /// A stored session is trusted without a network round-trip; an expired
    /// token is dealt with by the first request's 401 handling. A storage
    /// failure leaves the session signed out.
    pub fn restore(&self) -> SessionState {
        match self.store.load() {
            Ok(Some(stored)) => {
                info!(user_id = %stored.user.id, saved_at = %stored.saved_at, "Restored stored session");
                self.tokens.set(stored.tokens);
                self.state.set(SessionState::Authenticated(stored.user));
            }
            Ok(None) => {
                debug!("No stored session");
                self.tokens.clear();
                self.state.set(SessionState::SignedOut);
            }
            Err(e) => {
                error!(error = %e, "Failed to read stored session, starting signed out");
                self.tokens.clear();
                self.state.set(SessionState::SignedOut);
            }
        }
        self.loading.store(false, Ordering::Release);
        self.state()
    }

    pub fn is_loading_user_storage_data(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn user(&self) -> Option<User> {
        self.state.user()
    }

    /// Observe the current state, including forced sign-outs.
    ///
    /// Intermediate states can be skipped if several land before the
    /// receiver looks; use [`Session::transitions`] to see each one.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Every state transition from now on, in order.
    pub fn transitions(&self) -> broadcast::Receiver<SessionState> {
        self.state.transitions()
    }

    /// Client for authenticated API calls.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    /// Sign in and persist the new session.
    ///
    /// On failure the session is `SignedOut`, any previously stored session
    /// is cleared, and the error is returned as is.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ApiError> {
        // Anything queued against a previous session is stale now
        self.refresh.cancel_pending();
        self.state.set(SessionState::SigningIn);

        match self.establish(email, password).await {
            Ok(user) => {
                info!(user_id = %user.id, "Signed in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                self.tokens.clear();
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "Failed to clear stored session after sign-in failure");
                }
                self.state.set(SessionState::SignedOut);
                Err(e)
            }
        }
    }

    async fn establish(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let response = self.api.create_session(email, password).await?;
        let tokens = response.token_pair();

        self.store.save(&response.user, &tokens)?;
        self.tokens.set(tokens);
        self.state.set(SessionState::Authenticated(response.user.clone()));
        Ok(response.user)
    }

    /// Create an account, then sign in with it.
    ///
    /// If the account is created but the sign-in fails, the sign-in error
    /// is returned and the session stays `SignedOut`.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        self.api.create_user(name, email, password).await?;
        info!("Account created, signing in");
        self.sign_in(email, password).await
    }

    /// Drop the session, in memory and on disk. Safe to call when signed out.
    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.refresh.cancel_pending();
        self.tokens.clear();
        self.state.set(SessionState::SignedOut);
        self.store.clear()?;
        info!("Signed out");
        Ok(())
    }

    /// Update the profile on the server and replace the local user.
    ///
    /// The user in the response replaces the local one; an empty response
    /// keeps the local user with the new name.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, ApiError> {
        let current = self.user().ok_or(ApiError::Unauthorized)?;
        let returned: Option<User> = self.client.put_optional_json(USERS_PATH, &update).await?;

        let updated = returned.unwrap_or_else(|| current.with_name(update.name));
        if let Some(tokens) = self.tokens.get() {
            self.store.save(&updated, &tokens)?;
        }
        self.state.replace_user(updated.clone());
        info!(user_id = %updated.id, "Profile updated");
        Ok(updated)
    }

    #[cfg(test)]
    pub(crate) fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Nobody is left to receive a late refresh; release queued callers
        self.refresh.cancel_pending();
    }
}
