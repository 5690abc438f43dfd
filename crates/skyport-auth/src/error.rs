//! Error types for the auth crate.
//!
//! All authentication operations surface errors through [`AuthError`], the
//! single error type for this crate. The variants follow the portal's
//! failure taxonomy: transient network trouble is retryable by re-invoking
//! login, a rejected code is terminal for that attempt, a rejected token
//! forces logout, and a malformed upstream response is a contract bug that
//! is logged but never silently defaulted.

/// Unified error type for the skyport auth subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// An HTTP request to the provider failed at the transport layer
    /// (unreachable host, TLS failure, timeout). Retryable.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The authorization code was rejected as expired or already used.
    /// The user must restart the login flow.
    #[error("invalid or expired authorization code: {reason}")]
    InvalidCode {
        /// Explanation from the authorization server.
        reason: String,
    },

    /// The provider rejected the request itself (bad client credentials,
    /// wrong redirect URI). Surfaced as a configuration bug, not retried.
    #[error("provider rejected the request: {reason}")]
    ProviderRejected {
        /// Explanation from the provider.
        reason: String,
    },

    /// The access token was rejected by the resource API. Triggers a forced
    /// logout.
    #[error("access token rejected by provider")]
    Unauthorized,

    /// The provider answered with a server-side failure. Retryable.
    #[error("provider unavailable (HTTP {status})")]
    UpstreamUnavailable {
        /// The HTTP status the provider returned.
        status: u16,
    },

    /// The provider's response violated its own contract (e.g. a profile
    /// without an identifier). Fatal for the attempt; logged for diagnostics.
    #[error("malformed provider response: {reason}")]
    MalformedResponse {
        /// What was wrong with the response.
        reason: String,
    },

    /// The overall login flow failed for a non-specific reason (state
    /// mismatch, missing callback parameters).
    #[error("login flow failed: {reason}")]
    FlowFailed {
        /// Details about why the flow failed.
        reason: String,
    },

    /// The local callback listener timed out waiting for the redirect.
    #[error("callback timed out after {timeout_secs} seconds")]
    CallbackTimeout {
        /// How many seconds we waited before giving up.
        timeout_secs: u64,
    },

    /// An error propagated from the session store.
    #[error("session store error: {0}")]
    SessionStore(#[from] skyport_session::SessionStoreError),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (e.g. from the callback TCP listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Whether re-invoking login may succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::UpstreamUnavailable { .. } | Self::CallbackTimeout { .. }
        )
    }

    /// A message safe to show to end users.
    ///
    /// Raw provider error bodies stay in the logs; users get a short
    /// actionable sentence.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::UpstreamUnavailable { .. } => {
                "The campus service could not be reached. Please try again."
            }
            Self::InvalidCode { .. } => {
                "Your login link has expired. Please sign in again."
            }
            Self::Unauthorized => "Your session has ended. Please sign in again.",
            Self::CallbackTimeout { .. } => {
                "We did not hear back from the login page in time. Please try again."
            }
            _ => "Something went wrong during sign-in. Please try again.",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_code() {
        let err = AuthError::InvalidCode {
            reason: "code already used".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid or expired authorization code: code already used"
        );
    }

    #[test]
    fn error_display_upstream_unavailable() {
        let err = AuthError::UpstreamUnavailable { status: 503 };
        assert_eq!(err.to_string(), "provider unavailable (HTTP 503)");
    }

    #[test]
    fn error_display_callback_timeout() {
        let err = AuthError::CallbackTimeout { timeout_secs: 300 };
        assert_eq!(err.to_string(), "callback timed out after 300 seconds");
    }

    #[test]
    fn retryable_classification() {
        assert!(AuthError::UpstreamUnavailable { status: 502 }.is_retryable());
        assert!(AuthError::CallbackTimeout { timeout_secs: 1 }.is_retryable());
        assert!(
            !AuthError::InvalidCode {
                reason: "used".into()
            }
            .is_retryable()
        );
        assert!(!AuthError::Unauthorized.is_retryable());
    }

    #[test]
    fn user_messages_never_leak_provider_detail() {
        let err = AuthError::ProviderRejected {
            reason: "client_id mismatch for app 42-abc".to_string(),
        };
        assert!(!err.user_message().contains("42-abc"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
