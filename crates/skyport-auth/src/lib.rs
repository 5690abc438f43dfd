//! Skyport authentication: OAuth login, identity, and session lifecycle.
//!
//! This crate owns everything between "the user clicked Sign in" and "a
//! [`UserSession`](skyport_session::UserSession) is persisted and
//! observable":
//!
//! - [`exchange`] — the token exchange client. Holds the provider
//!   credentials server-side and swaps authorization codes for access
//!   tokens. The client secret never appears in any URL or log line.
//! - [`identity`] — fetches the authenticated user's profile and
//!   normalizes the provider's field names into the portal's canonical
//!   session record.
//! - [`callback`] — a loopback TCP listener that catches the browser
//!   redirect carrying the authorization code.
//! - [`controller`] — the state machine tying it all together:
//!   `Anonymous → Exchanging → FetchingProfile → Authenticated`, with
//!   failure parking in `Failed` and logout returning to `Anonymous`.
//!
//! Consumers normally interact only with [`AuthController`]; the lower
//! layers are public for direct use and testing.

pub mod callback;
pub mod controller;
pub mod error;
pub mod exchange;
pub mod identity;

pub use callback::CallbackListener;
pub use controller::{AuthController, AuthState, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS};
pub use error::{AuthError, Result};
pub use exchange::{GrantedToken, ProviderConfig, TokenExchange};
pub use identity::{IdentityClient, SESSION_TTL_DAYS};
