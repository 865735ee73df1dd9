//! User profile and credential types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user's profile.
///
/// Replaced wholesale on profile update, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Avatar file name on the server, if the user uploaded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    /// Full URL of the avatar image, served from `{base_url}/avatar/{file}`.
    pub fn avatar_url(&self, base_url: &str) -> Option<String> {
        self.avatar
            .as_deref()
            .filter(|file| !file.is_empty())
            .map(|file| format!("{}/avatar/{}", base_url.trim_end_matches('/'), file))
    }

    /// Copy of this user with a new display name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Access token plus the refresh token used to renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens end up in tracing fields through `?pair`; keep them out of logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Everything persisted for a session: the `user` record and the `tokens` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub user: User,
    pub tokens: TokenPair,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(user: User, tokens: TokenPair) -> Self {
        Self {
            user,
            tokens,
            saved_at: Utc::now(),
        }
    }
}

/// Profile edit submitted from the profile screen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(avatar: Option<&str>) -> User {
        User {
            id: "1".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            avatar: avatar.map(str::to_string),
        }
    }

    #[test]
    fn test_avatar_url_joins_base_url() {
        let u = user(Some("abc.png"));
        assert_eq!(
            u.avatar_url("http://localhost:3333/").as_deref(),
            Some("http://localhost:3333/avatar/abc.png")
        );
    }

    #[test]
    fn test_avatar_url_missing_or_empty() {
        assert_eq!(user(None).avatar_url("http://localhost:3333"), None);
        assert_eq!(user(Some("")).avatar_url("http://localhost:3333"), None);
    }

    #[test]
    fn test_user_without_email_deserializes() {
        let u: User = serde_json::from_str(r#"{"id":"1","name":"A"}"#).unwrap();
        assert_eq!(u.id, "1");
        assert_eq!(u.email, "");
        assert!(u.avatar.is_none());
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let pair = TokenPair::new("secret-access", "secret-refresh");
        let printed = format!("{:?}", pair);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_profile_update_omits_unset_passwords() {
        let update = ProfileUpdate {
            name: "Bea".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Bea" }));
    }
}
