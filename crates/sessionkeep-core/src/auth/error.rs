use thiserror::Error;

/// Failure to read or write persisted credentials.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure to obtain a fresh access token.
///
/// Cloned to every request waiting on the same refresh, so it carries
/// messages rather than source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh token rejected - please sign in again")]
    Rejected,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Network error during token refresh: {0}")]
    Network(String),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist refreshed tokens: {0}")]
    Storage(String),

    #[error("Token refresh cancelled by sign-out")]
    Cancelled,
}

impl From<StorageError> for RefreshError {
    fn from(err: StorageError) -> Self {
        RefreshError::Storage(err.to_string())
    }
}
