//! The canonical session record.
//!
//! [`UserSession`] is the normalized shape every part of the portal agrees
//! on. The identity fetcher produces it from the provider's profile payload,
//! the store persists it, and UI-facing code reads it back. Upstream field
//! names (`displayname`, `login`, `image.link`) never leak past the
//! normalization boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized record of an authenticated campus user.
///
/// `user_id` is the provider's opaque stable identifier and is immutable
/// once issued; every other field may be refreshed on re-login. Optional
/// fields are left `None` when the provider omits them — they are never
/// defaulted to placeholder values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Opaque stable identifier from the identity provider.
    pub user_id: String,

    /// Human-readable name shown in the UI.
    pub display_name: String,

    /// Unique short handle (the provider login name).
    pub login_handle: String,

    /// Contact address, if the provider shared one.
    pub email: Option<String>,

    /// Profile image URL, if the provider shared one.
    pub avatar_url: Option<String>,

    /// When this session was created.
    pub issued_at: DateTime<Utc>,

    /// When this session stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    /// Whether the session's validity window has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration) -> UserSession {
        let now = Utc::now();
        UserSession {
            user_id: "7421".to_string(),
            display_name: "J. Doe".to_string(),
            login_handle: "jdoe".to_string(),
            email: None,
            avatar_url: None,
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn future_expiry_is_not_expired() {
        assert!(!session(Duration::days(7)).is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        assert!(session(Duration::seconds(-1)).is_expired());
    }

    #[test]
    fn serde_roundtrip_preserves_fields() {
        let original = UserSession {
            email: Some("jdoe@student.example".to_string()),
            avatar_url: Some("https://cdn.example/jdoe.png".to_string()),
            ..session(Duration::days(7))
        };

        let json = serde_json::to_string(&original).unwrap();
        let restored: UserSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn optional_fields_absent_stay_absent() {
        let json = serde_json::to_string(&session(Duration::days(1))).unwrap();
        let restored: UserSession = serde_json::from_str(&json).unwrap();
        assert!(restored.email.is_none());
        assert!(restored.avatar_url.is_none());
    }
}
