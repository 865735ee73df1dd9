//! Observable session state.

use serde::{Deserialize, Serialize};

use super::User;

/// State of the one live session of an app instance.
///
/// `RefreshingSession` keeps the user so screens can keep rendering the
/// profile while a token refresh is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", content = "user", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    SignedOut,
    SigningIn,
    Authenticated(User),
    RefreshingSession(User),
    Expired,
}

impl SessionState {
    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) | SessionState::RefreshingSession(user) => {
                Some(user)
            }
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// Short label for logs and status lines
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::SignedOut => "signed-out",
            SessionState::SigningIn => "signing-in",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::RefreshingSession(_) => "refreshing",
            SessionState::Expired => "expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "7".to_string(),
            name: "Caio".to_string(),
            email: "caio@example.com".to_string(),
            avatar: None,
        }
    }

    #[test]
    fn test_user_present_while_refreshing() {
        assert_eq!(SessionState::RefreshingSession(user()).user(), Some(&user()));
        assert!(SessionState::Authenticated(user()).is_authenticated());
    }

    #[test]
    fn test_no_user_when_signed_out_or_expired() {
        assert!(SessionState::SignedOut.user().is_none());
        assert!(SessionState::SigningIn.user().is_none());
        assert!(!SessionState::Expired.is_authenticated());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(SessionState::Authenticated(user())).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["user"]["name"], "Caio");

        let json = serde_json::to_value(SessionState::SignedOut).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "signedOut" }));
    }
}
