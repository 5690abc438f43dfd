//! SQLite-backed encrypted session store.
//!
//! The [`SessionStore`] wraps a `rusqlite::Connection` and a 256-bit
//! encryption key. It tracks at most one session per store (the portal never
//! supports concurrent multi-account sessions), held in a single row keyed
//! by a fixed slot name. The serialized [`UserSession`] and the raw access
//! token are encrypted with AES-256-GCM and written in one SQL statement, so
//! no reader can ever observe a session without its token or vice versa.
//!
//! Expiry is enforced at read time: [`SessionStore::get`] deletes an expired
//! row and reports it as absent. There is no background sweep — the access
//! pattern is read-on-navigation, so the next read is always soon enough.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::crypto::StoreKey;
use crate::error::{Result, SessionStoreError};
use crate::types::UserSession;

/// The fixed slot name for the single tracked session.
const SESSION_SLOT: &str = "current";

/// AEAD label binding a sealed blob to its slot and column.
fn blob_label(column: &str) -> String {
    format!("{SESSION_SLOT}/{column}")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A session as returned by [`SessionStore::get`]: the decrypted user record
/// together with its access token.
///
/// The token is sensitive material. It is decrypted only in memory, is never
/// logged, and must not appear in any user-visible output.
#[derive(Debug, Clone)]
pub struct StoredSession {
    /// The normalized user record.
    pub user: UserSession,

    /// The bearer token for calling the identity/resource API.
    pub access_token: String,

    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Encrypted single-session store backed by SQLite.
///
/// # Example
///
/// ```rust,no_run
/// # use skyport_session::store::SessionStore;
/// # use skyport_session::crypto;
/// # fn example() -> skyport_session::error::Result<()> {
/// let key = crypto::generate_key()?;
/// let store = SessionStore::open("data/skyport.db", &key)?;
///
/// if let Some(stored) = store.get()? {
///     println!("signed in as {}", stored.user.login_handle);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionStore {
    conn: Connection,
    key: StoreKey,
}

impl SessionStore {
    /// Open (or create) a session store at `path` with the given `key`.
    ///
    /// Runs schema migrations automatically.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Database`] if the database cannot be
    /// opened, or [`SessionStoreError::MigrationFailed`] if schema setup
    /// fails.
    pub fn open(path: impl AsRef<std::path::Path>, key: &[u8]) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening session store");

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn,
            key: StoreKey::from_bytes(key)?,
        };

        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory session store (useful for testing).
    pub fn open_in_memory(key: &[u8]) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn,
            key: StoreKey::from_bytes(key)?,
        };

        store.run_migrations()?;
        Ok(store)
    }

    /// Configure SQLite pragmas for performance and safety.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    /// Run database schema migrations.
    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS session (
                slot        TEXT PRIMARY KEY,
                user        BLOB NOT NULL,
                user_nonce  BLOB NOT NULL,
                token       BLOB NOT NULL,
                token_nonce BLOB NOT NULL,
                expires_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );",
            )
            .map_err(|e| SessionStoreError::MigrationFailed {
                reason: e.to_string(),
            })?;

        tracing::debug!("session store schema ready");
        Ok(())
    }

    // -- Session operations -------------------------------------------------

    /// Store a session and its access token, overwriting any existing one.
    ///
    /// Both values are sealed (bound to their slot/column) and written in a
    /// single `INSERT OR REPLACE`, so the overwrite is atomic from a
    /// reader's point of view.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::EncryptionFailed`] if sealing either
    /// value fails, or [`SessionStoreError::Database`] on write failure.
    pub fn set(&self, session: &UserSession, access_token: &str) -> Result<()> {
        let user_plain = serde_json::to_vec(session)?;
        let user = self.key.seal(&blob_label("user"), &user_plain)?;
        let token = self.key.seal(&blob_label("token"), access_token.as_bytes())?;

        self.conn.execute(
            "INSERT OR REPLACE INTO session
                (slot, user, user_nonce, token, token_nonce, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                SESSION_SLOT,
                user.ciphertext,
                user.nonce.as_slice(),
                token.ciphertext,
                token.nonce.as_slice(),
                session.expires_at.timestamp(),
                Utc::now().timestamp(),
            ],
        )?;

        tracing::info!(user_id = %session.user_id, "session stored");
        Ok(())
    }

    /// Retrieve the current session, if one exists and is unexpired.
    ///
    /// An expired row is deleted as a side effect of this read and reported
    /// as absent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::DecryptionFailed`] if the stored data
    /// cannot be opened with this store's key.
    pub fn get(&self) -> Result<Option<StoredSession>> {
        let row = self
            .conn
            .query_row(
                "SELECT user, user_nonce, token, token_nonce, expires_at, updated_at
                 FROM session WHERE slot = ?1",
                params![SESSION_SLOT],
                |row| {
                    Ok(SessionRow {
                        user: row.get(0)?,
                        user_nonce: row.get(1)?,
                        token: row.get(2)?,
                        token_nonce: row.get(3)?,
                        expires_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Read-time invalidation: an expired row is treated as absent and
        // removed so later reads do not keep paying for the check.
        if row.expires_at <= Utc::now().timestamp() {
            tracing::debug!("stored session expired, clearing");
            self.clear()?;
            return Ok(None);
        }

        let user_plain = self
            .key
            .open(&blob_label("user"), &row.user_nonce, &row.user)?;
        let token_plain = self
            .key
            .open(&blob_label("token"), &row.token_nonce, &row.token)?;

        let user: UserSession = serde_json::from_slice(&user_plain)?;
        let access_token = String::from_utf8(token_plain)
            .map_err(|_| SessionStoreError::Internal("stored token is not UTF-8".into()))?;

        Ok(Some(StoredSession {
            user,
            access_token,
            updated_at: DateTime::from_timestamp(row.updated_at, 0).unwrap_or_default(),
        }))
    }

    /// Remove the session and its token together.
    ///
    /// Idempotent: clearing an empty store is not an error.
    pub fn clear(&self) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM session WHERE slot = ?1", params![SESSION_SLOT])?;

        if rows > 0 {
            tracing::info!("session cleared");
        }
        Ok(())
    }

}

// ---------------------------------------------------------------------------
// Internal row type (avoid leaking rusqlite details)
// ---------------------------------------------------------------------------

struct SessionRow {
    user: Vec<u8>,
    user_nonce: Vec<u8>,
    token: Vec<u8>,
    token_nonce: Vec<u8>,
    expires_at: i64,
    updated_at: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
