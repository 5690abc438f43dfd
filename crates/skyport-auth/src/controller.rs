//! The auth session controller.
//!
//! [`AuthController`] orchestrates the login flow end-to-end: it drives the
//! code exchange and profile fetch, persists the result in the session
//! store, and publishes every state change to subscribers over a watch
//! channel. It is the only writer of the session store and the primary
//! entry point for consuming code that needs to know who is signed in.
//!
//! The controller is a small state machine:
//!
//! ```text
//! Anonymous --(code)--> Exchanging --> FetchingProfile --> Authenticated
//!                            |                |
//!                            +---- failure ---+--> Failed --(ack)--> Anonymous
//! Authenticated --(logout / unauthorized)--> Anonymous
//! ```
//!
//! Transitions are serialized behind an async mutex, so an abandoned
//! in-flight login can never write over a newer state. Failures never touch
//! the store: whatever session existed before a failed attempt is still
//! there afterwards.

use std::sync::Mutex;

use chrono::DateTime;
use tokio::sync::watch;

use skyport_session::{SessionStore, UserSession};

use crate::callback::CallbackListener;
use crate::error::{AuthError, Result};
use crate::exchange::{ProviderConfig, TokenExchange};
use crate::identity::IdentityClient;

/// Default port for the local OAuth callback listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 8450;

/// Default timeout for the callback listener in seconds (5 minutes).
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The controller's observable state.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No session; nothing in flight.
    Anonymous,

    /// An authorization code is being exchanged for a token.
    Exchanging,

    /// A token was granted; the user profile is being fetched.
    FetchingProfile,

    /// A session exists and is persisted.
    Authenticated(UserSession),

    /// The last login attempt failed. Carries a user-safe message; the
    /// controller returns to [`AuthState::Anonymous`] once acknowledged.
    Failed(String),
}

// ---------------------------------------------------------------------------
// AuthController
// ---------------------------------------------------------------------------

/// Orchestrates login, logout, and session restore.
///
/// The `SessionStore` is wrapped in a `Mutex` because `rusqlite::Connection`
/// is not `Sync`. Store operations are synchronous and the lock is held
/// briefly for each one.
pub struct AuthController {
    store: Mutex<SessionStore>,
    exchange: TokenExchange,
    identity: IdentityClient,
    state_tx: watch::Sender<AuthState>,
    // Serializes whole login/logout transitions, not just store access.
    flow_lock: tokio::sync::Mutex<()>,
}

impl AuthController {
    /// Create a new controller over the given store and provider config.
    ///
    /// The controller starts in [`AuthState::Anonymous`]; call
    /// [`restore`](Self::restore) to pick up a persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the underlying HTTP clients cannot
    /// be built.
    pub fn new(store: SessionStore, config: ProviderConfig) -> Result<Self> {
        let identity = IdentityClient::new(&config.api_base_url)?;
        let exchange = TokenExchange::new(config)?;
        let (state_tx, _) = watch::channel(AuthState::Anonymous);

        Ok(Self {
            store: Mutex::new(store),
            exchange,
            identity,
            state_tx,
            flow_lock: tokio::sync::Mutex::new(()),
        })
    }

    // -- Observation --------------------------------------------------------

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// The current state (a snapshot).
    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    /// The currently authenticated user, if any.
    pub fn current_user(&self) -> Option<UserSession> {
        match &*self.state_tx.borrow() {
            AuthState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    // -- Startup ------------------------------------------------------------

    /// Restore a persisted session, if one exists and is unexpired.
    ///
    /// This is a single local read — no network call, no upstream
    /// re-validation. A token the provider has since revoked will surface as
    /// `Unauthorized` on the first protected call, at which point
    /// [`handle_unauthorized`](Self::handle_unauthorized) clears it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionStore`] if the store cannot be read.
    pub async fn restore(&self) -> Result<Option<UserSession>> {
        let _guard = self.flow_lock.lock().await;

        let stored = self.with_store(|s| s.get())?;

        match stored {
            Some(stored) => {
                tracing::info!(user_id = %stored.user.user_id, "session restored");
                self.state_tx
                    .send_replace(AuthState::Authenticated(stored.user.clone()));
                Ok(Some(stored.user))
            }
            None => {
                self.state_tx.send_replace(AuthState::Anonymous);
                Ok(None)
            }
        }
    }

    // -- Login --------------------------------------------------------------

    /// Log in with an authorization code from the redirect callback.
    ///
    /// Drives exchange → fetch → persist. On any failure the store is left
    /// untouched and the controller parks in [`AuthState::Failed`] with a
    /// user-safe message; the underlying error is returned to the caller and
    /// logged.
    ///
    /// # Errors
    ///
    /// See [`TokenExchange::exchange_code`] and
    /// [`IdentityClient::fetch_profile`] for the failure taxonomy.
    pub async fn login_with_code(&self, code: &str) -> Result<UserSession> {
        let _guard = self.flow_lock.lock().await;

        self.state_tx.send_replace(AuthState::Exchanging);

        let token = match self.exchange.exchange_code(code).await {
            Ok(token) => token,
            Err(e) => return Err(self.fail("code exchange", e)),
        };

        self.state_tx.send_replace(AuthState::FetchingProfile);

        let mut session = match self.identity.fetch_profile(&token.access_token).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail("profile fetch", e)),
        };

        // The session can never outlive the token backing it.
        if let Some(token_expiry) = token.expires_at.and_then(|ts| DateTime::from_timestamp(ts, 0))
            && token_expiry < session.expires_at
        {
            session.expires_at = token_expiry;
        }

        if let Err(e) = self.with_store(|s| s.set(&session, &token.access_token)) {
            return Err(self.fail("session persist", AuthError::from(e)));
        }

        tracing::info!(user_id = %session.user_id, "login complete");
        self.state_tx
            .send_replace(AuthState::Authenticated(session.clone()));

        Ok(session)
    }

    /// Log in with an already-fetched profile and token, bypassing exchange.
    ///
    /// Overwrites any existing session rather than erroring, so callers that
    /// already hold a trusted token (e.g. a just-completed refresh) can
    /// install it directly while the controller is `Authenticated`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionStore`] if persisting fails.
    pub async fn login_with_profile(
        &self,
        session: UserSession,
        access_token: &str,
    ) -> Result<()> {
        let _guard = self.flow_lock.lock().await;

        self.with_store(|s| s.set(&session, access_token))?;

        tracing::info!(user_id = %session.user_id, "session installed directly");
        self.state_tx
            .send_replace(AuthState::Authenticated(session));
        Ok(())
    }

    /// Perform the full interactive flow: print the authorization URL, wait
    /// for the browser redirect, verify the CSRF state, and log in.
    ///
    /// # Errors
    ///
    /// Any failure of the callback listener, state verification, exchange,
    /// or profile fetch.
    pub async fn authenticate_interactive(
        &self,
        port: u16,
        timeout_secs: u64,
    ) -> Result<UserSession> {
        // Random state for CSRF protection, verified on the redirect.
        let state = uuid::Uuid::now_v7().to_string();
        let auth_url = self.exchange.authorization_url(&state)?;

        tracing::info!(url = %auth_url, "open this URL in your browser to sign in");

        let (code, returned_state) = CallbackListener::start(port, timeout_secs).await?;

        if returned_state != state {
            let err = AuthError::FlowFailed {
                reason: "state parameter mismatch on redirect".to_string(),
            };
            return Err(self.fail("state verification", err));
        }

        self.login_with_code(&code).await
    }

    // -- Logout and recovery ------------------------------------------------

    /// Log out: clear the store, then notify subscribers.
    ///
    /// The store is cleared before the state change is published, so no
    /// subscriber reacting to the notification can observe a stale session.
    /// Idempotent — logging out twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionStore`] if the store cannot be cleared.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.flow_lock.lock().await;

        self.with_store(|s| s.clear())?;
        self.state_tx.send_replace(AuthState::Anonymous);

        tracing::info!("logged out");
        Ok(())
    }

    /// Acknowledge a failed login attempt, returning to `Anonymous`.
    ///
    /// A no-op in any state other than [`AuthState::Failed`]. The check and
    /// the transition happen under the channel's own lock, so an
    /// acknowledgement racing a fresh login can never clobber its state.
    pub fn acknowledge_failure(&self) {
        self.state_tx.send_if_modified(|state| {
            if matches!(state, AuthState::Failed(_)) {
                *state = AuthState::Anonymous;
                true
            } else {
                false
            }
        });
    }

    /// Handle a protected call that came back `Unauthorized`: the token is
    /// dead, so force a logout. The next login starts from `Anonymous`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionStore`] if the store cannot be cleared.
    pub async fn handle_unauthorized(&self) -> Result<()> {
        tracing::warn!("token rejected upstream, forcing logout");
        self.logout().await
    }

    // -- Internal helpers ---------------------------------------------------

    /// Run a closure against the locked store.
    fn with_store<T>(
        &self,
        f: impl FnOnce(&SessionStore) -> skyport_session::error::Result<T>,
    ) -> Result<T> {
        let store = self.store.lock().map_err(|e| AuthError::FlowFailed {
            reason: format!("session store lock poisoned: {e}"),
        })?;
        f(&store).map_err(AuthError::from)
    }

    /// Record a failure: log the full error, publish a user-safe message.
    fn fail(&self, stage: &str, err: AuthError) -> AuthError {
        tracing::warn!(stage, error = %err, "login attempt failed");
        self.state_tx
            .send_replace(AuthState::Failed(err.user_message().to_string()));
        err
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
