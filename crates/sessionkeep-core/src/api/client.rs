//! API client for authenticated requests.
//!
//! Every request goes through the bearer/refresh pipeline in
//! `interceptor`: the current access token is attached, a 401 triggers a
//! coalesced refresh and a single replay, and 429s are retried with
//! exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Request, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::interceptor::{self, Attempt, Disposition};
use super::ApiError;
use crate::auth::{RefreshCoordinator, RefreshError, TokenCell};

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Client for the app's API.
/// Clone is cheap - reqwest::Client and the token cell are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: TokenCell,
    refresh: Arc<RefreshCoordinator>,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        tokens: TokenCell,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            refresh,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first rate-limit backoff delay (doubles on each retry)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start building a request to `path`; send it with [`ApiClient::execute`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request through the bearer/refresh pipeline.
    ///
    /// A 401 on a request that carried a token refreshes the token once and
    /// replays the request once. If the refresh fails the caller gets
    /// `SessionExpired`, never the raw 401.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let is_refresh_call = interceptor::is_refresh_request(&request);
        let url = request.url().to_string();

        let mut attempt = Attempt::Original;
        let mut current = request;
        let mut token_override: Option<String> = None;
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let replay = current.try_clone();
            let sent_token = if is_refresh_call {
                None
            } else {
                token_override.take().or_else(|| self.tokens.access_token())
            };

            let outgoing = interceptor::attach_bearer(current, sent_token.as_deref())?;
            let response = self.client.execute(outgoing).await?;
            let status = response.status();

            match interceptor::classify(status, is_refresh_call, sent_token.is_some(), attempt) {
                Disposition::Deliver => return Ok(response),
                Disposition::RefreshRejected => {
                    return Err(ApiError::Refresh(RefreshError::Rejected));
                }
                Disposition::Throttled => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    current = replay.ok_or(ApiError::NotReplayable)?;
                }
                Disposition::RefreshAndReplay => {
                    let Some(replay) = replay else {
                        return Err(ApiError::NotReplayable);
                    };
                    debug!(url = %url, "Unauthorized, refreshing access token");
                    match self.refresh.get_fresh_token(sent_token.as_deref()).await {
                        Ok(pair) => {
                            token_override = Some(pair.access_token);
                            attempt = Attempt::Replay;
                            current = replay;
                        }
                        Err(RefreshError::Cancelled) => return Err(ApiError::Cancelled),
                        Err(e) => return Err(ApiError::SessionExpired(e)),
                    }
                }
                Disposition::Fail => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_status(status, &body));
                }
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let request = builder.build()?;
        let url = request.url().to_string();
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(self.request(Method::PUT, path).json(body)).await
    }

    /// `PUT` whose response body may be empty; `None` when it is.
    pub async fn put_optional_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        let request = self.request(Method::PUT, path).json(body).build()?;
        let url = request.url().to_string();
        let text = self.execute(request).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }
}
