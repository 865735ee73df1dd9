//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `Session`: the signed-in user state machine exposed to the UI
//! - `CredentialStore`: durable storage for the user and token pair
//!   (file, OS keychain or memory)
//! - `RefreshCoordinator`: coalesces concurrent access-token refreshes
//! - `TokenCell`: the in-memory token read by the API client

pub mod credentials;
pub mod error;
pub mod refresh;
pub mod session;
pub mod state;
pub mod tokens;

pub use credentials::{CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use error::{RefreshError, StorageError};
pub use refresh::RefreshCoordinator;
pub use session::Session;
pub use state::SessionStateHandle;
pub use tokens::TokenCell;
