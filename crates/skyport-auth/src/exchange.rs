//! OAuth 2.0 token exchange against the campus identity provider.
//!
//! This module implements the server-side half of the authorization code
//! flow (RFC 6749): building the authorization URL the browser is sent to,
//! and exchanging the returned single-use code for an access token. The
//! client secret lives only in this process; it is never part of any URL
//! handed to the browser.
//!
//! The exchange itself is stateless — tokens returned here are not
//! persisted. The session store owns persistence, which keeps this client
//! trivial to mock in tests.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Timeout applied to every outbound call, mapped to a network failure.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the campus identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The OAuth client ID registered with the provider.
    pub client_id: String,

    /// The OAuth client secret. Held server-side only.
    pub client_secret: String,

    /// The authorization endpoint URL.
    pub auth_url: String,

    /// The token endpoint URL.
    pub token_url: String,

    /// Base URL of the provider's resource API (profile, events).
    pub api_base_url: String,

    /// The redirect URI registered with the provider.
    pub redirect_uri: String,

    /// The scopes to request.
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// An access token granted by the provider's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantedToken {
    /// The bearer token used to authenticate API requests.
    pub access_token: String,

    /// The token type (typically "Bearer").
    pub token_type: String,

    /// Unix timestamp (seconds) when the token expires, if the provider
    /// said so.
    pub expires_at: Option<i64>,
}

impl GrantedToken {
    /// Whether this token is expired.
    ///
    /// Returns `true` if the token has an `expires_at` timestamp in the past
    /// (with a 60-second safety margin so we never use a token that expires
    /// mid-request).
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => chrono::Utc::now().timestamp() >= (expires_at - 60),
            // No expiry info means we assume the token is valid.
            None => false,
        }
    }
}

/// Raw token response from the provider.
///
/// This is the JSON shape returned by the token endpoint. We parse this
/// internally and convert to [`GrantedToken`].
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

impl TokenResponse {
    /// Convert into [`GrantedToken`], computing `expires_at` from
    /// `expires_in`.
    fn into_token(self) -> GrantedToken {
        let expires_at = self
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);

        GrantedToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
        }
    }
}

/// Raw error response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Token exchange client
// ---------------------------------------------------------------------------

/// Client for the provider's token endpoint.
pub struct TokenExchange {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl TokenExchange {
    /// Create a new exchange client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built;
    /// the 10-second request bound is not negotiable, so there is no
    /// fallback client.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { config, client })
    }

    /// The provider configuration this client was built from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Build the authorization URL the user's browser should visit.
    ///
    /// Includes a `state` parameter the caller must verify on the redirect
    /// to prevent CSRF.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UrlParse`] if the configured `auth_url` is not a
    /// valid URL.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("state", state);

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.scopes.join(" "));
            }
        }

        Ok(url.to_string())
    }

    /// Exchange a single-use authorization code for an access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCode`] if the provider rejects the code as
    ///   expired or already used.
    /// - [`AuthError::ProviderRejected`] if the request itself is rejected
    ///   (client credential or redirect URI mismatch).
    /// - [`AuthError::Network`] / [`AuthError::UpstreamUnavailable`] on
    ///   transport failure or provider outage — retryable.
    pub async fn exchange_code(&self, code: &str) -> Result<GrantedToken> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidCode {
                reason: "authorization code is empty".to_string(),
            });
        }

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        tracing::debug!(token_url = %self.config.token_url, "exchanging authorization code");

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    /// Obtain an application-level token via the client credentials grant.
    ///
    /// Used for calls that are not on behalf of a user, such as listing
    /// public campus events.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`exchange_code`](Self::exchange_code) except
    /// [`AuthError::InvalidCode`].
    pub async fn client_credentials(&self) -> Result<GrantedToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        tracing::debug!(token_url = %self.config.token_url, "requesting application token");

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    /// Parse the HTTP response from the token endpoint.
    async fn parse_token_response(response: reqwest::Response) -> Result<GrantedToken> {
        let status = response.status();

        if status.is_success() {
            let token_response: TokenResponse =
                response
                    .json()
                    .await
                    .map_err(|e| AuthError::MalformedResponse {
                        reason: format!("token endpoint returned unparsable body: {e}"),
                    })?;
            tracing::debug!("token exchange successful");
            return Ok(token_response.into_token());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::classify_token_error(status.as_u16(), &body))
    }

    /// Map a non-success token endpoint response onto the failure taxonomy.
    fn classify_token_error(status: u16, body: &str) -> AuthError {
        if status >= 500 {
            tracing::warn!(status, "token endpoint unavailable");
            return AuthError::UpstreamUnavailable { status };
        }

        // Try the standard OAuth error body first.
        if let Ok(error_response) = serde_json::from_str::<TokenErrorResponse>(body) {
            let reason = error_response
                .error_description
                .unwrap_or_else(|| error_response.error.clone());

            if error_response.error == "invalid_grant" {
                return AuthError::InvalidCode { reason };
            }
            return AuthError::ProviderRejected { reason };
        }

        AuthError::ProviderRejected {
            reason: format!("HTTP {status}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-secret".to_string(),
            auth_url: "https://id.campus.example/oauth/authorize".to_string(),
            token_url: "https://id.campus.example/oauth/token".to_string(),
            api_base_url: "https://id.campus.example".to_string(),
            redirect_uri: "http://127.0.0.1:8450/callback".to_string(),
            scopes: vec!["public".to_string()],
        }
    }

    #[test]
    fn authorization_url_includes_all_params() {
        let exchange = TokenExchange::new(test_config()).unwrap();
        let url_str = exchange.authorization_url("random-state").unwrap();

        let url = Url::parse(&url_str).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();

        assert_eq!(params.get("response_type").unwrap(), "code");
        assert_eq!(params.get("client_id").unwrap(), "test-client-id");
        assert_eq!(
            params.get("redirect_uri").unwrap(),
            "http://127.0.0.1:8450/callback"
        );
        assert_eq!(params.get("state").unwrap(), "random-state");
        assert_eq!(params.get("scope").unwrap(), "public");
    }

    #[test]
    fn authorization_url_never_contains_the_secret() {
        let exchange = TokenExchange::new(test_config()).unwrap();
        let url_str = exchange.authorization_url("state").unwrap();
        assert!(!url_str.contains("test-secret"));
    }

    #[test]
    fn authorization_url_without_scopes() {
        let mut config = test_config();
        config.scopes = vec![];
        let exchange = TokenExchange::new(config).unwrap();
        let url_str = exchange.authorization_url("state").unwrap();

        let url = Url::parse(&url_str).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert!(!params.contains_key("scope"));
    }

    #[test]
    fn token_response_parsing() {
        let json = r#"{
            "access_token": "tok_xyz",
            "token_type": "bearer",
            "expires_in": 7200
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = response.into_token();

        assert_eq!(token.access_token, "tok_xyz");
        assert_eq!(token.token_type, "bearer");
        assert!(token.expires_at.is_some());
    }

    #[test]
    fn token_response_minimal() {
        let json = r#"{ "access_token": "tok_minimal" }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = response.into_token();

        assert_eq!(token.access_token, "tok_minimal");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn is_expired_with_future_expiry() {
        let token = GrantedToken {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        };
        assert!(!token.is_expired());
    }

    #[test]
    fn is_expired_within_safety_margin() {
        let token = GrantedToken {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            // 30 seconds from now is within the 60-second safety margin.
            expires_at: Some(chrono::Utc::now().timestamp() + 30),
        };
        assert!(token.is_expired());
    }

    #[test]
    fn is_expired_with_no_expiry() {
        let token = GrantedToken {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn empty_code_rejected_without_network() {
        let exchange = TokenExchange::new(test_config()).unwrap();
        let result = exchange.exchange_code("  ").await;
        assert!(matches!(result, Err(AuthError::InvalidCode { .. })));
    }

    #[test]
    fn invalid_grant_maps_to_invalid_code() {
        let body = r#"{ "error": "invalid_grant", "error_description": "The code has expired" }"#;
        let err = TokenExchange::classify_token_error(400, body);
        assert!(matches!(err, AuthError::InvalidCode { .. }));
        assert!(err.to_string().contains("The code has expired"));
    }

    #[test]
    fn invalid_client_maps_to_provider_rejected() {
        let body = r#"{ "error": "invalid_client" }"#;
        let err = TokenExchange::classify_token_error(401, body);
        assert!(matches!(err, AuthError::ProviderRejected { .. }));
    }

    #[test]
    fn server_error_maps_to_upstream_unavailable() {
        let err = TokenExchange::classify_token_error(503, "");
        assert!(matches!(
            err,
            AuthError::UpstreamUnavailable { status: 503 }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn unparsable_error_body_maps_to_provider_rejected() {
        let err = TokenExchange::classify_token_error(400, "<html>oops</html>");
        assert!(matches!(err, AuthError::ProviderRejected { .. }));
    }

    #[test]
    fn exchange_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenExchange>();
        assert_send_sync::<ProviderConfig>();
        assert_send_sync::<GrantedToken>();
    }
}
