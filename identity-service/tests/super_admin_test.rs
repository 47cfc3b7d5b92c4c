//! Super admin access control tests: single-session invariant,
//! inactivity timeout, MFA gating, rate limiting, IP allow-listing,
//! and last-admin protection.

mod common;

use chrono::{Duration, Utc};
use common::{request_meta, verified_admin_session, TestApp};
use identity_service::models::super_admin::revoke_reason;
use identity_service::models::{RateLimitWindow, SuperAdminSession};
use identity_service::services::IdentityError;
use identity_service::utils;

#[tokio::test]
async fn create_session_requires_active_super_admin() {
    let app = TestApp::new();
    let user = app.seed_user("plain@example.com").await;

    let err = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::PermissionDenied(_)));
}

#[tokio::test]
async fn creating_a_second_session_revokes_the_first() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("op@platform.test", false, false).await;

    let (first, first_token) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();
    let (_second, second_token) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();

    // Never two simultaneously valid sessions for one super admin
    assert!(app
        .state
        .super_admins
        .validate_session(&first_token)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .state
        .super_admins
        .validate_session(&second_token)
        .await
        .unwrap()
        .is_some());

    let revoked = app
        .store()
        .find_super_admin_session_by_id(first.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        revoked.revoked_reason.as_deref(),
        Some(revoke_reason::SUPERSEDED)
    );
}

#[tokio::test]
async fn session_expires_after_absolute_cap() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("cap@platform.test", false, false).await;

    let raw_token = utils::generate_token();
    let mut session =
        SuperAdminSession::new(user.user_id, utils::hash_token(&raw_token), 4, 30, &request_meta());
    session.expiry_utc = Utc::now() - Duration::seconds(1);
    app.store()
        .replace_super_admin_session(&session)
        .await
        .unwrap();

    assert!(app
        .state
        .super_admins
        .validate_session(&raw_token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn inactivity_lapse_auto_revokes_with_reason() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("idle@platform.test", false, false).await;

    let raw_token = utils::generate_token();
    let mut session =
        SuperAdminSession::new(user.user_id, utils::hash_token(&raw_token), 4, 30, &request_meta());
    session.last_activity_utc = Utc::now() - Duration::minutes(31);
    app.store()
        .replace_super_admin_session(&session)
        .await
        .unwrap();

    assert!(app
        .state
        .super_admins
        .validate_session(&raw_token)
        .await
        .unwrap()
        .is_none());

    let revoked = app
        .store()
        .find_super_admin_session_by_id(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        revoked.revoked_reason.as_deref(),
        Some(revoke_reason::INACTIVITY)
    );
}

#[tokio::test]
async fn validation_slides_the_inactivity_window() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("active@platform.test", false, false).await;

    let (session, raw_token) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();
    let before = session.last_activity_utc;

    let validated = app
        .state
        .super_admins
        .validate_session(&raw_token)
        .await
        .unwrap()
        .unwrap();
    assert!(validated.last_activity_utc >= before);
}

#[tokio::test]
async fn mfa_challenge_gates_verification() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("mfa@platform.test", false, false).await;

    let (session, _) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();

    // MFA-enabled accounts start untrusted with an open challenge
    assert!(!session.mfa_verified);
    assert!(session.mfa_challenge_expiry_utc.is_some());

    app.state
        .super_admins
        .mark_mfa_verified(session.session_id)
        .await
        .unwrap();

    let verified = app
        .store()
        .find_super_admin_session_by_id(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(verified.mfa_verified);
}

#[tokio::test]
async fn mfa_verification_fails_after_challenge_window() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("mfa-late@platform.test", false, false).await;

    let (session, _) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();
    app.store()
        .set_mfa_challenge(session.session_id, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    let err = app
        .state
        .super_admins
        .mark_mfa_verified(session.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Authentication(_)));
}

#[tokio::test]
async fn rate_limit_is_a_fixed_window_counter() {
    let app = TestApp::new();
    let user = app.seed_user("limited@example.com").await;

    for _ in 0..3 {
        assert!(app
            .state
            .super_admins
            .check_rate_limit(user.user_id, "admin_login", 3, 60)
            .await
            .unwrap());
    }
    assert!(!app
        .state
        .super_admins
        .check_rate_limit(user.user_id, "admin_login", 3, 60)
        .await
        .unwrap());

    // A different bucket has its own window
    assert!(app
        .state
        .super_admins
        .check_rate_limit(user.user_id, "impersonation", 3, 60)
        .await
        .unwrap());
}

#[tokio::test]
async fn rate_limit_window_resets_on_expiry() {
    let app = TestApp::new();
    let user = app.seed_user("reset@example.com").await;

    let stale = RateLimitWindow {
        user_id: user.user_id,
        bucket: "admin_login".to_string(),
        window_start_utc: Utc::now() - Duration::seconds(120),
        count: 99,
    };
    app.store().put_rate_limit_window(&stale).await.unwrap();

    // The lapsed window no longer counts against the caller
    assert!(app
        .state
        .super_admins
        .check_rate_limit(user.user_id, "admin_login", 3, 60)
        .await
        .unwrap());

    let fresh = app
        .store()
        .find_rate_limit_window(user.user_id, "admin_login")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.count, 1);
}

#[tokio::test]
async fn ip_allowlist_fails_open_when_empty() {
    let app = TestApp::new();
    assert!(app
        .state
        .super_admins
        .check_ip_allowlist("203.0.113.10")
        .await
        .unwrap());

    let (user, _, _) =
        verified_admin_session(&app, "allow@platform.test", false, false).await;
    app.state
        .super_admins
        .add_ip_allowlist_entry(user.user_id, "203.0.113.10".to_string(), None, &request_meta())
        .await
        .unwrap();

    // Once any entry exists, only listed IPs pass
    assert!(app
        .state
        .super_admins
        .check_ip_allowlist("203.0.113.10")
        .await
        .unwrap());
    assert!(!app
        .state
        .super_admins
        .check_ip_allowlist("198.51.100.7")
        .await
        .unwrap());
}

#[tokio::test]
async fn grant_requires_manager_capability() {
    let app = TestApp::new();
    let (actor, _) = app.seed_super_admin("no-manage@platform.test", false, false).await;
    let target = app.seed_user("target@example.com").await;

    let err = app
        .state
        .super_admins
        .grant_super_admin(actor.user_id, target.user_id, false, false, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::PermissionDenied(_)));
}

#[tokio::test]
async fn revoke_disables_target_and_kills_their_sessions() {
    let app = TestApp::new();
    let (manager, _) = app.seed_super_admin("manager@platform.test", false, true).await;
    let (other, _) = app.seed_super_admin("other@platform.test", false, false).await;

    let (_, other_token) = app
        .state
        .super_admins
        .create_session(other.user_id, &request_meta())
        .await
        .unwrap();

    app.state
        .super_admins
        .revoke_super_admin(manager.user_id, other.user_id, &request_meta())
        .await
        .unwrap();

    assert!(app
        .state
        .super_admins
        .find_active(other.user_id)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .state
        .super_admins
        .validate_session(&other_token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn revoking_the_last_active_super_admin_fails() {
    let app = TestApp::new();
    let (last, _) = app.seed_super_admin("last@platform.test", false, true).await;

    // Self-revocation is refused outright
    let err = app
        .state
        .super_admins
        .revoke_super_admin(last.user_id, last.user_id, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));

    // A non-admin actor cannot revoke them either
    let outsider = app.seed_user("outsider@example.com").await;
    let err = app
        .state
        .super_admins
        .revoke_super_admin(outsider.user_id, last.user_id, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::PermissionDenied(_)));

    // Registry unchanged: still exactly one active super admin
    assert_eq!(app.store().count_active_super_admins().await.unwrap(), 1);
    assert!(app
        .state
        .super_admins
        .find_active(last.user_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn self_revocation_is_always_refused() {
    let app = TestApp::new();
    let (a, _) = app.seed_super_admin("self-a@platform.test", false, true).await;
    let (_b, _) = app.seed_super_admin("self-b@platform.test", false, true).await;

    let err = app
        .state
        .super_admins
        .revoke_super_admin(a.user_id, a.user_id, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));

    assert!(app
        .state
        .super_admins
        .find_active(a.user_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn disable_user_revokes_sessions_and_protects_last_admin() {
    let app = TestApp::new();
    let (manager, _) = app.seed_super_admin("dis-mgr@platform.test", false, true).await;
    let victim = app.seed_user_with_password("victim@example.com").await;

    let (_, session_token) = app
        .state
        .sessions
        .create_session(victim.user_id, None, &request_meta())
        .await
        .unwrap();

    app.state
        .super_admins
        .disable_user(manager.user_id, victim.user_id, &request_meta())
        .await
        .unwrap();

    let disabled = app
        .store()
        .find_user_by_id(victim.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(disabled.is_disabled());
    assert!(app
        .state
        .sessions
        .validate_session(&session_token)
        .await
        .unwrap()
        .is_none());

    // Disabling the only active super admin is refused
    let other = app.seed_user("bystander@example.com").await;
    let err = app
        .state
        .super_admins
        .disable_user(other.user_id, manager.user_id, &request_meta())
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));
}

#[tokio::test]
async fn elevated_actions_append_audit_entries() {
    let app = TestApp::new();
    let (user, _) = app.seed_super_admin("audited@platform.test", false, false).await;

    app.state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();

    let entries = app
        .state
        .super_admins
        .list_audit_entries(None, 10)
        .await
        .unwrap();
    assert!(entries.iter().any(|e| e.action == "super_admin.login"));
    assert_eq!(
        entries
            .iter()
            .find(|e| e.action == "super_admin.login")
            .unwrap()
            .ip
            .as_deref(),
        Some("198.51.100.7")
    );
}
