use serde::Deserialize;
use thiserror::Error;

use crate::auth::{RefreshError, StorageError};

#[derive(Error, Debug)]
pub enum ApiError {
    /// Expected, user-facing rejection carrying the server's message
    #[error("{message}")]
    App { status: u16, message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Access denied: {}", truncate_body(.body))]
    AccessDenied { body: String },

    #[error("Resource not found: {}", truncate_body(.body))]
    NotFound { body: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error {status}: {}", truncate_body(.body))]
    ServerError { status: u16, body: String },

    /// Any other non-success status, passed through untouched
    #[error("Unexpected status {status}: {}", truncate_body(.body))]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session expired - please sign in again")]
    SessionExpired(#[source] RefreshError),

    #[error("Token refresh failed: {0}")]
    Refresh(RefreshError),

    #[error("Request cancelled by sign-out")]
    Cancelled,

    #[error("Request body cannot be replayed")]
    NotReplayable,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Generic text shown for anything that is not an `App` error
const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Truncate a response body for display; the error itself keeps all of it.
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

impl ApiError {
    /// Server-provided `{"message": ...}` from an error body, if present.
    fn app_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|b| b.message)
            .filter(|m| !m.trim().is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        if (400..500).contains(&code) && code != 429 {
            if let Some(message) = Self::app_message(body) {
                return ApiError::App {
                    status: code,
                    message,
                };
            }
        }

        let body = body.to_string();
        match code {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied { body },
            404 => ApiError::NotFound { body },
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError { status: code, body },
            _ => ApiError::Status { status: code, body },
        }
    }

    /// HTTP status behind this error, when it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::App { status, .. }
            | ApiError::ServerError { status, .. }
            | ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            ApiError::AccessDenied { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::RateLimited => Some(429),
            _ => None,
        }
    }

    /// True when the session is gone and the UI should return to sign-in.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            ApiError::SessionExpired(_) | ApiError::Refresh(_) | ApiError::Cancelled
        )
    }

    /// Text a screen may show: the server's message for `App` errors,
    /// a generic sentence for everything else.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::App { message, .. } => message.clone(),
            ApiError::SessionExpired(_) | ApiError::Refresh(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Network(_) => {
                "Unable to connect to server. Check your connection and try again.".to_string()
            }
            _ => GENERIC_MESSAGE.to_string(),
        }
    }
}
