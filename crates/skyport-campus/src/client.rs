//! HTTP client for the campus API.
//!
//! Campus and event listings are public-ish data fetched with an app-level
//! token (client credentials grant), never with a user's token. The client
//! caches that token and refreshes it transparently when it nears expiry.

use tokio::sync::Mutex;

use skyport_auth::exchange::REQUEST_TIMEOUT_SECS;
use skyport_auth::{GrantedToken, ProviderConfig, TokenExchange};

use crate::error::{CampusError, Result};
use crate::events::{Campus, CampusEvent, RawCampus, RawEvent};

/// Default page size when listing upcoming events.
pub const DEFAULT_EVENT_PAGE_SIZE: u32 = 20;

/// Client for campus and event lookups.
pub struct CampusClient {
    api_base_url: String,
    client: reqwest::Client,
    exchange: TokenExchange,
    app_token: Mutex<Option<GrantedToken>>,
}

impl CampusClient {
    /// Create a new client. App tokens are minted lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CampusError::Network`] or [`CampusError::Auth`] if either
    /// HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let api_base_url = config.api_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            api_base_url,
            client,
            exchange: TokenExchange::new(config)?,
            app_token: Mutex::new(None),
        })
    }

    /// List all campuses.
    ///
    /// # Errors
    ///
    /// Transport and upstream failures; a body that is not a campus array.
    pub async fn list_campuses(&self) -> Result<Vec<Campus>> {
        let url = format!("{}/v2/campus", self.api_base_url);
        let raw: Vec<RawCampus> = self.get_json(&url, &[]).await?;
        Ok(raw.into_iter().map(Campus::from).collect())
    }

    /// Find a campus by exact name.
    ///
    /// # Errors
    ///
    /// [`CampusError::CampusNotFound`] if no campus carries that name, plus
    /// the usual transport and upstream failures.
    pub async fn find_campus(&self, name: &str) -> Result<Campus> {
        self.list_campuses()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CampusError::CampusNotFound {
                name: name.to_string(),
            })
    }

    /// List upcoming events for a campus, soonest first.
    ///
    /// Events the API sends without a start time are dropped with a warning
    /// rather than failing the whole listing.
    ///
    /// # Errors
    ///
    /// Transport and upstream failures; a body that is not an event array.
    pub async fn upcoming_events(
        &self,
        campus_id: i64,
        page_size: u32,
    ) -> Result<Vec<CampusEvent>> {
        let url = format!("{}/v2/campus/{campus_id}/events", self.api_base_url);
        let page_size = page_size.to_string();
        let query = [
            ("filter[future]", "true"),
            ("sort", "begin_at"),
            ("page[size]", page_size.as_str()),
        ];

        let raw: Vec<RawEvent> = self.get_json(&url, &query).await?;

        let mut events = Vec::with_capacity(raw.len());
        for raw_event in raw {
            match CampusEvent::from_raw(raw_event) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "skipping malformed event record"),
            }
        }

        tracing::debug!(campus_id, count = events.len(), "fetched upcoming events");
        Ok(events)
    }

    // -- Internal -----------------------------------------------------------

    /// Perform an authenticated GET and deserialize the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.app_token().await?;

        let response = self
            .client
            .get(url)
            .query(query)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // The cached app token died early; drop it so the next call
            // mints a fresh one.
            self.app_token.lock().await.take();
            return Err(CampusError::Auth(skyport_auth::AuthError::Unauthorized));
        }

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), url, "campus API unavailable");
            return Err(CampusError::UpstreamUnavailable {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(CampusError::MalformedResponse {
                reason: format!("campus API returned HTTP {}", status.as_u16()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CampusError::MalformedResponse {
                reason: format!("body did not match the expected shape: {e}"),
            })
    }

    /// The cached app token, refreshed via client credentials when missing
    /// or near expiry.
    async fn app_token(&self) -> Result<String> {
        let mut slot = self.app_token.lock().await;

        if let Some(token) = slot.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        tracing::debug!("minting app-level token");
        let token = self.exchange.client_credentials().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);

        Ok(access_token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
