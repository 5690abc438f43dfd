//! Identity fetcher: bearer token in, normalized [`UserSession`] out.
//!
//! Calls the provider's authenticated-user endpoint and normalizes its
//! profile payload (`id`, `displayname`, `login`, `email`, `image.link`)
//! into the portal's canonical session record. Upstream field names stop
//! here; the rest of the portal only ever sees [`UserSession`].

use chrono::{Duration, Utc};
use serde::Deserialize;

use skyport_session::UserSession;

use crate::error::{AuthError, Result};
use crate::exchange::REQUEST_TIMEOUT_SECS;

/// How long a freshly minted session stays valid, unless the provider's
/// token expires earlier: 7 days.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Path of the authenticated-user endpoint, relative to the API base.
const ME_PATH: &str = "/v2/me";

// ---------------------------------------------------------------------------
// Raw provider shapes
// ---------------------------------------------------------------------------

/// The profile payload as the provider sends it. Only the fields we
/// normalize are modeled; everything else is ignored.
#[derive(Debug, Deserialize)]
struct RawProfile {
    id: Option<serde_json::Value>,
    login: Option<String>,
    displayname: Option<String>,
    email: Option<String>,
    image: Option<RawImage>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    link: Option<String>,
}

// ---------------------------------------------------------------------------
// Identity client
// ---------------------------------------------------------------------------

/// Client for the provider's profile endpoint.
pub struct IdentityClient {
    api_base_url: String,
    client: reqwest::Client,
    session_ttl: Duration,
}

impl IdentityClient {
    /// Create a new identity client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn new(api_base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client,
            session_ttl: Duration::days(SESSION_TTL_DAYS),
        })
    }

    /// Override the session validity window (mostly for tests).
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Fetch the caller's profile and normalize it into a [`UserSession`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] if the token is invalid or expired —
    ///   the caller must restart login.
    /// - [`AuthError::UpstreamUnavailable`] on provider outage — retryable.
    /// - [`AuthError::MalformedResponse`] if the payload is missing the
    ///   mandatory identifier or cannot be parsed — fatal, no partial
    ///   session is ever constructed.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserSession> {
        let url = format!("{}{}", self.api_base_url, ME_PATH);

        tracing::debug!(url = %url, "fetching user profile");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "profile endpoint unavailable");
            return Err(AuthError::UpstreamUnavailable {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(AuthError::MalformedResponse {
                reason: format!("profile endpoint returned HTTP {}", status.as_u16()),
            });
        }

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| AuthError::MalformedResponse {
                    reason: format!("profile body is not JSON: {e}"),
                })?;

        self.normalize(payload)
    }

    /// Normalize a raw profile payload into a [`UserSession`].
    ///
    /// Kept separate from the HTTP call so the mapping is testable with
    /// plain JSON fixtures.
    fn normalize(&self, payload: serde_json::Value) -> Result<UserSession> {
        let raw: RawProfile =
            serde_json::from_value(payload).map_err(|e| AuthError::MalformedResponse {
                reason: format!("unexpected profile shape: {e}"),
            })?;

        // The identifier is mandatory. A profile without one is a provider
        // contract violation; constructing a partial session would poison
        // everything downstream.
        let user_id = match raw.id {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            _ => {
                tracing::error!("profile payload is missing the user identifier");
                return Err(AuthError::MalformedResponse {
                    reason: "profile is missing the mandatory 'id' field".to_string(),
                });
            }
        };

        let login_handle = raw
            .login
            .filter(|l| !l.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse {
                reason: "profile is missing the 'login' field".to_string(),
            })?;

        // Fall back to the login handle when the provider sends no display
        // name; that is the user's real handle, not a placeholder.
        let display_name = raw
            .displayname
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| login_handle.clone());

        let avatar_url = raw.image.and_then(|i| i.link).filter(|l| !l.is_empty());
        let email = raw.email.filter(|e| !e.is_empty());

        let now = Utc::now();
        let session = UserSession {
            user_id,
            display_name,
            login_handle,
            email,
            avatar_url,
            issued_at: now,
            expires_at: now + self.session_ttl,
        };

        tracing::info!(user_id = %session.user_id, login = %session.login_handle, "profile normalized");
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
