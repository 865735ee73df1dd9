//! REST API client module.
//!
//! This module provides `AuthApi` for the unauthenticated session
//! endpoints and `ApiClient` for everything else. `ApiClient` attaches
//! the bearer token and transparently refreshes it on a 401.

pub mod auth;
pub mod client;
pub mod error;
pub mod interceptor;

pub use auth::{AuthApi, SessionResponse, REFRESH_PATH, SESSIONS_PATH, USERS_PATH};
pub use client::ApiClient;
pub use error::ApiError;
