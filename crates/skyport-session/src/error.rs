//! Error types for the session store crate.
//!
//! All store operations surface errors through [`SessionStoreError`], the
//! single error type for this crate.

/// Unified error type for the skyport session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    /// An underlying SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema setup or upgrade failed.
    #[error("migration failed: {reason}")]
    MigrationFailed {
        /// Why the migration failed.
        reason: String,
    },

    /// Encrypting the session record or token failed.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Details from the crypto layer.
        reason: String,
    },

    /// Decrypting a stored record failed (wrong key or corrupted data).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Details from the crypto layer.
        reason: String,
    },

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SessionStoreError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_migration_failed() {
        let err = SessionStoreError::MigrationFailed {
            reason: "bad schema".to_string(),
        };
        assert_eq!(err.to_string(), "migration failed: bad schema");
    }

    #[test]
    fn error_display_decryption_failed() {
        let err = SessionStoreError::DecryptionFailed {
            reason: "wrong key".to_string(),
        };
        assert_eq!(err.to_string(), "decryption failed: wrong key");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionStoreError>();
    }
}
