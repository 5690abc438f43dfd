//! At-rest encryption for the session store.
//!
//! [`StoreKey`] wraps a 256-bit AES-GCM key and seals the two values the
//! store persists (the session record and the access token). Every sealed
//! blob is bound to a caller-supplied label via the AEAD's additional
//! authenticated data, so a ciphertext copied into the wrong column fails
//! authentication instead of decrypting to the wrong thing.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, SessionStoreError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// A nonce and the ciphertext it seals (tag included).
#[derive(Debug)]
pub struct SealedBlob {
    pub nonce: [u8; NONCE_LEN_BYTES],
    pub ciphertext: Vec<u8>,
}

/// Generate a fresh random store key.
///
/// The caller owns persistence of the bytes (the CLI keeps them in a
/// key file); feed them back through [`StoreKey::from_bytes`] to reopen
/// the store.
///
/// # Errors
///
/// Returns [`SessionStoreError::Internal`] if the system CSPRNG fails.
pub fn generate_key() -> Result<[u8; KEY_LEN]> {
    let mut bytes = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| SessionStoreError::Internal("failed to generate key material".into()))?;
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// StoreKey
// ---------------------------------------------------------------------------

/// The store's encryption key, parsed once at open time.
pub struct StoreKey {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl StoreKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::EncryptionFailed`] unless `bytes` is
    /// exactly [`KEY_LEN`] bytes of valid key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(SessionStoreError::EncryptionFailed {
                reason: format!("key must be {} bytes, got {}", KEY_LEN, bytes.len()),
            });
        }

        let unbound =
            UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| SessionStoreError::EncryptionFailed {
                reason: "invalid AES-256-GCM key material".into(),
            })?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Seal `plaintext` under this key, bound to `label`.
    ///
    /// The label is authenticated but not stored; [`open`](Self::open) must
    /// be called with the same label or authentication fails. A fresh random
    /// nonce is drawn per call.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::EncryptionFailed`] if the CSPRNG or the
    /// seal operation fails.
    pub fn seal(&self, label: &str, plaintext: &[u8]) -> Result<SealedBlob> {
        let mut nonce = [0u8; NONCE_LEN_BYTES];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| SessionStoreError::EncryptionFailed {
                reason: "failed to generate nonce".into(),
            })?;

        let mut ciphertext = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(label.as_bytes()),
                &mut ciphertext,
            )
            .map_err(|_| SessionStoreError::EncryptionFailed {
                reason: format!("sealing '{label}' failed"),
            })?;

        Ok(SealedBlob { nonce, ciphertext })
    }

    /// Open a blob sealed with [`seal`](Self::seal) under the same `label`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::DecryptionFailed`] if the nonce is
    /// malformed, the key or label does not match, or the ciphertext was
    /// altered.
    pub fn open(&self, label: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| {
            SessionStoreError::DecryptionFailed {
                reason: format!("stored nonce for '{label}' has the wrong length"),
            }
        })?;

        let mut buf = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(label.as_bytes()), &mut buf)
            .map_err(|_| SessionStoreError::DecryptionFailed {
                reason: format!("authentication of '{label}' failed (wrong key, label, or corrupted data)"),
            })?;

        Ok(plaintext.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StoreKey {
        StoreKey::from_bytes(&generate_key().unwrap()).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = key();
        let record = br#"{"user_id":"7421","login_handle":"jdoe"}"#;

        let sealed = key.seal("current/user", record).unwrap();
        let opened = key
            .open("current/user", &sealed.nonce, &sealed.ciphertext)
            .unwrap();

        assert_eq!(opened, record);
    }

    #[test]
    fn label_mismatch_fails_authentication() {
        let key = key();
        let sealed = key.seal("current/token", b"tok_xyz").unwrap();

        // A token blob moved into the user column must not open.
        let result = key.open("current/user", &sealed.nonce, &sealed.ciphertext);
        assert!(matches!(
            result,
            Err(SessionStoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = key().seal("current/token", b"tok_xyz").unwrap();

        let other = key();
        let result = other.open("current/token", &sealed.nonce, &sealed.ciphertext);
        assert!(result.is_err());
    }

    #[test]
    fn altered_ciphertext_is_rejected() {
        let key = key();
        let mut sealed = key.seal("current/user", b"record").unwrap();
        sealed.ciphertext[0] ^= 0x01;

        let result = key.open("current/user", &sealed.nonce, &sealed.ciphertext);
        assert!(result.is_err());
    }

    #[test]
    fn short_key_material_is_rejected() {
        let result = StoreKey::from_bytes(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(SessionStoreError::EncryptionFailed { .. })
        ));
    }

    #[test]
    fn truncated_nonce_is_rejected() {
        let key = key();
        let sealed = key.seal("current/user", b"record").unwrap();

        let result = key.open("current/user", &sealed.nonce[..8], &sealed.ciphertext);
        assert!(matches!(
            result,
            Err(SessionStoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn each_seal_draws_a_fresh_nonce() {
        let key = key();
        let a = key.seal("current/user", b"record").unwrap();
        let b = key.seal("current/user", b"record").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn generated_keys_are_distinct() {
        assert_ne!(generate_key().unwrap(), generate_key().unwrap());
    }
}
