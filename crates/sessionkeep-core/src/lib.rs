//! sessionkeep core library.
//!
//! Session and token lifecycle for an app backed by a token-authenticated
//! REST API: sign-in/sign-up/sign-out, durable credentials, and an API
//! client that refreshes an expired access token once for any number of
//! concurrent requests and replays them with the new token.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, RefreshError, Session, StorageError};
pub use config::{Config, StorageBackend};
pub use models::{ProfileUpdate, SessionState, TokenPair, User};
