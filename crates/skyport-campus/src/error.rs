//! Error types for the campus data crate.

/// Unified error type for campus and event lookups.
#[derive(Debug, thiserror::Error)]
pub enum CampusError {
    /// Transport-level failure talking to the campus API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Acquiring or refreshing the app-level token failed.
    #[error("authentication error: {0}")]
    Auth(#[from] skyport_auth::AuthError),

    /// No campus with the requested name exists.
    #[error("campus not found: {name}")]
    CampusNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The campus API answered with a server-side failure.
    #[error("campus API unavailable (HTTP {status})")]
    UpstreamUnavailable {
        /// The HTTP status the API returned.
        status: u16,
    },

    /// The campus API's response could not be interpreted.
    #[error("malformed campus API response: {reason}")]
    MalformedResponse {
        /// What was wrong with the response.
        reason: String,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CampusError>;
