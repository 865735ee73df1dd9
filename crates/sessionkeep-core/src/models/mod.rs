//! Data models for sessions and users.
//!
//! This module contains the data structures shared by the credential
//! store, the API client and the session state machine:
//!
//! - `User`: the signed-in profile
//! - `TokenPair`: access + refresh token
//! - `StoredSession`: the persisted document holding both
//! - `SessionState`: the observable state of a session

pub mod state;
pub mod user;

pub use state::SessionState;
pub use user::{ProfileUpdate, StoredSession, TokenPair, User};
