//! Coalesced access-token refresh.
//!
//! However many requests hit a 401 at once, one refresh call goes out.
//! Callers queue a one-shot continuation; the first caller to find the
//! slot empty spawns the refresh, and its outcome is delivered to every
//! queued caller in arrival order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{CredentialStore, RefreshError, SessionStateHandle, TokenCell};
use crate::api::AuthApi;
use crate::models::TokenPair;

type Waiter = oneshot::Sender<Result<TokenPair, RefreshError>>;

#[derive(Default)]
struct RefreshSlot {
    in_flight: bool,
    /// Bumped on cancel; a refresh started under an older generation is discarded
    generation: u64,
    waiters: Vec<Waiter>,
}

pub struct RefreshCoordinator {
    api: AuthApi,
    store: Arc<dyn CredentialStore>,
    tokens: TokenCell,
    state: SessionStateHandle,
    slot: Mutex<RefreshSlot>,
}

impl RefreshCoordinator {
    pub fn new(
        api: AuthApi,
        store: Arc<dyn CredentialStore>,
        tokens: TokenCell,
        state: SessionStateHandle,
    ) -> Self {
        Self {
            api,
            store,
            tokens,
            state,
            slot: Mutex::new(RefreshSlot::default()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, RefreshSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_slot().in_flight
    }

    /// Get a token pair newer than `stale_access_token`.
    ///
    /// Joins the outstanding refresh if there is one. If a refresh already
    /// replaced the stale token, the current pair is returned without a
    /// network call.
    pub async fn get_fresh_token(
        self: &Arc<Self>,
        stale_access_token: Option<&str>,
    ) -> Result<TokenPair, RefreshError> {
        let rx = {
            let mut slot = self.lock_slot();

            if !slot.in_flight {
                match (stale_access_token, self.tokens.get()) {
                    // Signed out (or a refresh already failed) since the request left
                    (_, None) => return Err(RefreshError::NoRefreshToken),
                    (Some(stale), Some(current)) if current.access_token != stale => {
                        debug!("Access token already refreshed");
                        return Ok(current);
                    }
                    _ => {}
                }
            }

            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);

            if slot.in_flight {
                debug!(queued = slot.waiters.len(), "Joining in-flight token refresh");
            } else {
                slot.in_flight = true;
                let generation = slot.generation;
                let refresh_token = self.tokens.refresh_token();
                let this = Arc::clone(self);
                tokio::spawn(async move { this.run_refresh(generation, refresh_token).await });
            }
            rx
        };

        // A dropped sender means the refresh task died
        rx.await.unwrap_or(Err(RefreshError::Cancelled))
    }

    async fn run_refresh(self: Arc<Self>, generation: u64, refresh_token: Option<String>) {
        // State changes only happen under the slot lock with a current
        // generation, so an orphaned refresh never touches a newer session.
        {
            let slot = self.lock_slot();
            if slot.generation != generation {
                debug!("Token refresh cancelled before it started");
                return;
            }
            debug!("Refreshing access token");
            self.state.begin_refresh();
        }

        let outcome = match refresh_token {
            Some(ref token) => self.api.refresh_token(token).await,
            None => Err(RefreshError::NoRefreshToken),
        };

        let (waiters, outcome) = {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                debug!("Discarding token refresh from a cancelled session");
                return;
            }

            // Persist under the slot lock so a concurrent sign-out cannot
            // clear the store before these tokens land in it.
            let outcome = outcome.and_then(|pair| self.persist(pair));
            match outcome {
                Ok(ref pair) => {
                    self.tokens.set(pair.clone());
                    self.state.finish_refresh();
                }
                Err(ref e) => {
                    warn!(error = %e, waiters = slot.waiters.len(), "Token refresh failed");
                    self.tokens.clear();
                    if let Err(e) = self.store.clear() {
                        warn!(error = %e, "Failed to clear credentials after refresh failure");
                    }
                    self.state.expire();
                }
            }

            slot.in_flight = false;
            (std::mem::take(&mut slot.waiters), outcome)
        };

        if outcome.is_ok() {
            info!(waiters = waiters.len(), "Access token refreshed");
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn persist(&self, pair: TokenPair) -> Result<TokenPair, RefreshError> {
        let user = self.state.user().ok_or(RefreshError::Cancelled)?;
        self.store.save(&user, &pair)?;
        Ok(pair)
    }

    /// Fail every queued caller with `Cancelled` and orphan the in-flight
    /// refresh so its result is thrown away.
    pub fn cancel_pending(&self) {
        let waiters = {
            let mut slot = self.lock_slot();
            slot.generation += 1;
            slot.in_flight = false;
            std::mem::take(&mut slot.waiters)
        };

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Cancelling queued token refresh waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(RefreshError::Cancelled));
        }
    }
}
