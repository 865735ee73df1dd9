use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::models::{SessionState, User};

/// Transitions buffered for slow `transitions()` receivers before they lag.
const TRANSITION_BUFFER: usize = 64;

/// Shared handle to the session state channel.
///
/// Every transition, voluntary or not, goes through the same `watch`
/// channel, so observers see forced sign-outs exactly like manual ones.
/// The `watch` side only keeps the latest state; `transitions()` yields
/// each one, including the short-lived `Expired`.
#[derive(Clone)]
pub struct SessionStateHandle {
    tx: Arc<watch::Sender<SessionState>>,
    transitions: broadcast::Sender<SessionState>,
}

impl SessionStateHandle {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            tx: Arc::new(tx),
            transitions,
        }
    }

    pub fn get(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.tx.borrow().user().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Every transition from now on, in order.
    pub fn transitions(&self) -> broadcast::Receiver<SessionState> {
        self.transitions.subscribe()
    }

    pub(crate) fn set(&self, state: SessionState) {
        let mut from = "";
        self.tx.send_modify(|current| {
            from = current.label();
            *current = state;
            self.announce(current);
        });
        debug!(from, to = self.tx.borrow().label(), "Session state changed");
    }

    /// `Authenticated(user)` becomes `RefreshingSession(user)`; other states are left alone.
    pub(crate) fn begin_refresh(&self) {
        self.modify(|state| match state {
            SessionState::Authenticated(user) => {
                *state = SessionState::RefreshingSession(user.clone());
                true
            }
            _ => false,
        });
    }

    /// `RefreshingSession(user)` returns to `Authenticated(user)`.
    pub(crate) fn finish_refresh(&self) {
        self.modify(|state| match state {
            SessionState::RefreshingSession(user) => {
                *state = SessionState::Authenticated(user.clone());
                true
            }
            _ => false,
        });
    }

    /// Swap in an updated profile without leaving the authenticated states.
    pub(crate) fn replace_user(&self, updated: User) {
        self.modify(|state| match state {
            SessionState::Authenticated(user) | SessionState::RefreshingSession(user) => {
                *user = updated.clone();
                true
            }
            _ => false,
        });
    }

    /// Involuntary sign-out: passes through `Expired` and lands on `SignedOut`.
    pub(crate) fn expire(&self) {
        info!("Session expired, signing out");
        self.set(SessionState::Expired);
        self.set(SessionState::SignedOut);
    }

    fn modify(&self, apply: impl FnOnce(&mut SessionState) -> bool) {
        self.tx.send_if_modified(|state| {
            let changed = apply(state);
            if changed {
                self.announce(state);
            }
            changed
        });
    }

    // Called with the watch value locked, so transitions go out in order
    fn announce(&self, state: &SessionState) {
        // No receivers is fine
        let _ = self.transitions.send(state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "1".to_string(),
            name: "A".to_string(),
            email: String::new(),
            avatar: None,
        }
    }

    #[test]
    fn test_refresh_round_trip_keeps_user() {
        let handle = SessionStateHandle::new(SessionState::Authenticated(user()));

        handle.begin_refresh();
        assert_eq!(handle.get(), SessionState::RefreshingSession(user()));
        assert_eq!(handle.user(), Some(user()));

        handle.finish_refresh();
        assert_eq!(handle.get(), SessionState::Authenticated(user()));
    }

    #[test]
    fn test_begin_refresh_ignored_when_signed_out() {
        let handle = SessionStateHandle::new(SessionState::SignedOut);
        handle.begin_refresh();
        assert_eq!(handle.get(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn test_expire_notifies_subscribers() {
        let handle = SessionStateHandle::new(SessionState::Authenticated(user()));
        let mut rx = handle.subscribe();

        handle.expire();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::SignedOut);
    }

    #[test]
    fn test_transitions_keep_every_step() {
        let handle = SessionStateHandle::new(SessionState::Authenticated(user()));
        let mut transitions = handle.transitions();

        handle.begin_refresh();
        handle.begin_refresh();
        handle.expire();

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SessionState::RefreshingSession(user()),
                SessionState::Expired,
                SessionState::SignedOut,
            ]
        );
    }
}
