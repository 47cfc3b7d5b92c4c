//! Session lifecycle tests: a session validates iff it is neither
//! revoked nor expired.

mod common;

use chrono::{Duration, Utc};
use common::{request_meta, TestApp};
use identity_service::models::Session;
use identity_service::utils;

#[tokio::test]
async fn validate_session_accepts_live_token() {
    let app = TestApp::new();
    let user = app.seed_user("sessions@example.com").await;

    let (session, raw_token) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();

    let validated = app
        .state
        .sessions
        .validate_session(&raw_token)
        .await
        .unwrap()
        .expect("session should validate");
    assert_eq!(validated.session_id, session.session_id);
    assert_eq!(validated.ip.as_deref(), Some("198.51.100.7"));

    // The raw token is never stored
    assert_ne!(session.token_hash, raw_token);
}

#[tokio::test]
async fn validate_session_rejects_unknown_token() {
    let app = TestApp::new();
    let result = app
        .state
        .sessions
        .validate_session("not-a-real-token")
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn validate_session_rejects_revoked_token() {
    let app = TestApp::new();
    let user = app.seed_user("revoked@example.com").await;

    let (session, raw_token) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();

    app.state
        .sessions
        .revoke_session(session.session_id)
        .await
        .unwrap();

    assert!(app
        .state
        .sessions
        .validate_session(&raw_token)
        .await
        .unwrap()
        .is_none());

    // Revocation is idempotent
    app.state
        .sessions
        .revoke_session(session.session_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn validate_session_rejects_expired_token() {
    let app = TestApp::new();
    let user = app.seed_user("expired@example.com").await;

    let raw_token = utils::generate_token();
    let mut session = Session::new(
        user.user_id,
        None,
        utils::hash_token(&raw_token),
        30,
        &request_meta(),
    );
    session.expiry_utc = Utc::now() - Duration::seconds(5);
    app.store().insert_session(&session).await.unwrap();

    assert!(app
        .state
        .sessions
        .validate_session(&raw_token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn validate_session_by_id_has_same_guarantee() {
    let app = TestApp::new();
    let user = app.seed_user("by-id@example.com").await;

    let (session, _) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();

    assert!(app
        .state
        .sessions
        .validate_session_by_id(session.session_id)
        .await
        .unwrap()
        .is_some());

    app.state
        .sessions
        .revoke_session(session.session_id)
        .await
        .unwrap();

    assert!(app
        .state
        .sessions
        .validate_session_by_id(session.session_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn revoke_all_sessions_revokes_every_open_session() {
    let app = TestApp::new();
    let user = app.seed_user("revoke-all@example.com").await;

    let (_, token_a) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();
    let (_, token_b) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();

    let revoked = app
        .state
        .sessions
        .revoke_all_sessions(user.user_id)
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    assert!(app.state.sessions.validate_session(&token_a).await.unwrap().is_none());
    assert!(app.state.sessions.validate_session(&token_b).await.unwrap().is_none());
}

#[tokio::test]
async fn sweep_deletes_only_expired_sessions() {
    let app = TestApp::new();
    let user = app.seed_user("sweep@example.com").await;

    let (_, live_token) = app
        .state
        .sessions
        .create_session(user.user_id, None, &request_meta())
        .await
        .unwrap();

    let raw_token = utils::generate_token();
    let mut stale = Session::new(
        user.user_id,
        None,
        utils::hash_token(&raw_token),
        30,
        &request_meta(),
    );
    stale.expiry_utc = Utc::now() - Duration::days(1);
    app.store().insert_session(&stale).await.unwrap();

    let deleted = app.state.sessions.sweep_expired_sessions().await.unwrap();
    assert_eq!(deleted, 1);

    assert!(app
        .state
        .sessions
        .validate_session(&live_token)
        .await
        .unwrap()
        .is_some());
}
