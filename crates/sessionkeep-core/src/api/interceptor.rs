//! Request and response stages of the authenticated request pipeline.
//!
//! Both stages are pure; `ApiClient::execute` drives them around the
//! actual network call.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, StatusCode};

use super::auth::REFRESH_PATH;
use super::ApiError;

/// Which send of a request this is. Each request gets one replay at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Original,
    Replay,
}

/// What the client should do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the response to the caller
    Deliver,
    /// Get a fresh access token and send the request again
    RefreshAndReplay,
    /// The refresh call itself was rejected; never retried
    RefreshRejected,
    /// 429 - back off and resend
    Throttled,
    /// Convert to an `ApiError` and fail
    Fail,
}

/// Set or strip the bearer header for the given access token.
pub fn attach_bearer(mut request: Request, access_token: Option<&str>) -> Result<Request, ApiError> {
    match access_token {
        Some(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("access token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            request.headers_mut().remove(AUTHORIZATION);
        }
    }
    Ok(request)
}

pub fn is_refresh_request(request: &Request) -> bool {
    request.url().path().ends_with(REFRESH_PATH)
}

/// Decide how to handle a response.
///
/// Only a 401 on the first send of a request that carried a token is
/// worth a refresh. A 401 on a replay is final.
pub fn classify(
    status: StatusCode,
    is_refresh_call: bool,
    sent_with_token: bool,
    attempt: Attempt,
) -> Disposition {
    if status.is_success() {
        return Disposition::Deliver;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Disposition::Throttled,
        StatusCode::UNAUTHORIZED if is_refresh_call => Disposition::RefreshRejected,
        StatusCode::UNAUTHORIZED if sent_with_token && attempt == Attempt::Original => {
            Disposition::RefreshAndReplay
        }
        _ => Disposition::Fail,
    }
}
