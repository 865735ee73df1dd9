//! Unauthenticated endpoints: sign-in, sign-up and token refresh.
//!
//! These calls never go through the bearer/refresh pipeline. The refresh
//! call in particular must not, or a rejected refresh token would trigger
//! another refresh.

use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::RefreshError;
use crate::models::{TokenPair, User};

pub const SESSIONS_PATH: &str = "/sessions";
pub const USERS_PATH: &str = "/users";
pub const REFRESH_PATH: &str = "/sessions/refresh-token";

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body of a successful `POST /sessions`.
#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

impl SessionResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair::new(self.token.clone(), self.refresh_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    #[serde(alias = "refreshToken")]
    refresh_token: String,
}

/// Client for the auth endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// `POST /sessions` - exchange credentials for a user and token pair
    pub async fn create_session(&self, email: &str, password: &str) -> Result<SessionResponse, ApiError> {
        let response = self
            .client
            .post(self.url(SESSIONS_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&SignInRequest { email, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("session response: {}", e)))?;

        debug!(user_id = %session.user.id, "Session created");
        Ok(session)
    }

    /// `POST /users` - create an account. Does not start a session.
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(USERS_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&SignUpRequest { name, email, password })
            .send()
            .await?;

        Self::check_response(response).await?;
        debug!("Account created");
        Ok(())
    }

    /// `POST /sessions/refresh-token` - trade a refresh token for a new pair
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .header(header::ACCEPT, "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RefreshError::Rejected);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Refresh endpoint returned an error");
            return Err(match ApiError::from_status(status, &body) {
                // 4xx with a message means the server refused this refresh token
                ApiError::App { .. } => RefreshError::Rejected,
                other => RefreshError::InvalidResponse(other.to_string()),
            });
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        Ok(TokenPair::new(refreshed.token, refreshed.refresh_token))
    }
}
