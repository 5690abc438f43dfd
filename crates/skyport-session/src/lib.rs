//! Encrypted session store for the skyport campus portal.
//!
//! This crate owns the portal's local session state:
//!
//! - **[`UserSession`]** — the canonical, normalized record of an
//!   authenticated campus user.
//! - **[`SessionStore`]** — a SQLite-backed store holding at most one
//!   session, with the record and its access token encrypted at rest
//!   (AES-256-GCM) and written together atomically.
//!
//! Expiry is handled at read time: a `get()` that finds an expired row
//! deletes it and reports the store as empty. A session therefore exists in
//! storage exactly when a successful login has completed and has not been
//! cleared or aged out.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use skyport_session::store::SessionStore;
//! use skyport_session::crypto;
//!
//! # fn example() -> skyport_session::error::Result<()> {
//! let key = crypto::generate_key()?;
//! let store = SessionStore::open("data/skyport.db", &key)?;
//!
//! match store.get()? {
//!     Some(stored) => println!("hello, {}", stored.user.display_name),
//!     None => println!("not signed in"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod store;
pub mod types;

// Re-export key types at the crate root for convenience.
pub use error::SessionStoreError;
pub use store::{SessionStore, StoredSession};
pub use types::UserSession;
