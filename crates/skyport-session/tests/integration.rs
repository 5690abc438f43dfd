//! Integration tests for the skyport-session crate.
//!
//! These exercise the full session lifecycle — store, read back, overwrite,
//! expiry invalidation, and clear — through the public API only.

use chrono::{Duration, Utc};
use skyport_session::crypto;
use skyport_session::store::SessionStore;
use skyport_session::types::UserSession;

/// Create a test store with a random key.
fn test_store() -> SessionStore {
    let key = crypto::generate_key().unwrap();
    SessionStore::open_in_memory(&key).unwrap()
}

fn session_for(user_id: &str, expires_in: Duration) -> UserSession {
    let now = Utc::now();
    UserSession {
        user_id: user_id.to_string(),
        display_name: "J. Doe".to_string(),
        login_handle: "jdoe".to_string(),
        email: None,
        avatar_url: Some("https://cdn.example/jdoe.png".to_string()),
        issued_at: now,
        expires_at: now + expires_in,
    }
}

#[test]
fn session_lifecycle() {
    let store = test_store();

    // Empty at first.
    assert!(store.get().unwrap().is_none());

    // Store.
    let session = session_for("7421", Duration::days(7));
    store.set(&session, "tok_xyz").unwrap();

    // Read back.
    let stored = store.get().unwrap().expect("session should be present");
    assert_eq!(stored.user.user_id, "7421");
    assert_eq!(stored.user.login_handle, "jdoe");
    assert_eq!(stored.access_token, "tok_xyz");

    // Clear.
    store.clear().unwrap();
    assert!(store.get().unwrap().is_none());
}

#[test]
fn relogin_overwrites_previous_session() {
    let store = test_store();

    store
        .set(&session_for("100", Duration::days(7)), "tok_old")
        .unwrap();
    store
        .set(&session_for("200", Duration::days(7)), "tok_new")
        .unwrap();

    let stored = store.get().unwrap().unwrap();
    assert_eq!(stored.user.user_id, "200");
    assert_eq!(stored.access_token, "tok_new");
}

#[test]
fn expired_session_is_absent() {
    let store = test_store();
    store
        .set(&session_for("7421", Duration::hours(-1)), "tok_stale")
        .unwrap();

    // Expired rows read as absent, and the next read stays absent.
    assert!(store.get().unwrap().is_none());
    assert!(store.get().unwrap().is_none());
}

#[test]
fn double_clear_is_harmless() {
    let store = test_store();
    store
        .set(&session_for("7421", Duration::days(7)), "tok")
        .unwrap();

    store.clear().unwrap();
    store.clear().unwrap();
    assert!(store.get().unwrap().is_none());
}

#[test]
fn on_disk_store_roundtrip() {
    let key = crypto::generate_key().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skyport.db");

    let session = session_for("7421", Duration::days(7));
    {
        let store = SessionStore::open(&path, &key).unwrap();
        store.set(&session, "tok_disk").unwrap();
    }

    let store = SessionStore::open(&path, &key).unwrap();
    let stored = store.get().unwrap().unwrap();
    assert_eq!(stored.user, session);
    assert_eq!(stored.access_token, "tok_disk");
}
