//! Impersonation manager tests: precondition codes, the hard 1-hour
//! cap, session supersession, and token shape.

mod common;

use chrono::{Duration, Utc};
use common::{request_meta, TestApp};
use identity_service::models::impersonation::{end_reason, IMPERSONATION_DURATION_MINUTES};
use identity_service::models::ImpersonationSession;
use identity_service::services::{IdentityError, ImpersonationErrorCode};
use uuid::Uuid;

struct Fixture {
    app: TestApp,
    admin_id: Uuid,
    admin_session_id: Uuid,
    target_id: Uuid,
    tenant_id: Uuid,
}

async fn fixture() -> Fixture {
    let app = TestApp::new();
    let (admin, _) = app.seed_super_admin("operator@platform.test", true, false).await;
    let (admin_session, _) = app
        .state
        .super_admins
        .create_session(admin.user_id, &request_meta())
        .await
        .unwrap();

    let target = app.seed_user("creator@example.com").await;
    let org = app.seed_org("acme").await;
    app.seed_membership(&target, &org, "member").await;

    Fixture {
        app,
        admin_id: admin.user_id,
        admin_session_id: admin_session.session_id,
        target_id: target.user_id,
        tenant_id: org.organization_id,
    }
}

fn expect_code(err: IdentityError, code: ImpersonationErrorCode) {
    match err {
        IdentityError::Impersonation(actual) => assert_eq!(actual, code),
        other => panic!("expected impersonation error {:?}, got {}", code, other),
    }
}

#[tokio::test]
async fn blank_reason_is_rejected_without_creating_a_session() {
    let f = fixture().await;

    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "   ",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::ReasonRequired);

    // No session, no audit entry
    let entries = f
        .app
        .state
        .super_admins
        .list_audit_entries(None, 100)
        .await
        .unwrap();
    assert!(!entries.iter().any(|e| e.action == "impersonation.start"));
}

#[tokio::test]
async fn actor_without_capability_is_rejected() {
    let f = fixture().await;

    // An admin without can_impersonate
    let (no_cap, _) = f
        .app
        .seed_super_admin("no-cap@platform.test", false, false)
        .await;
    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            no_cap.user_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "checking an order discrepancy",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::NotSuperAdmin);

    // A plain user
    let plain = f.app.seed_user("plain@example.com").await;
    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            plain.user_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "checking an order discrepancy",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::NotSuperAdmin);
}

#[tokio::test]
async fn unknown_target_is_rejected() {
    let f = fixture().await;
    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            Uuid::new_v4(),
            f.tenant_id,
            "support ticket 1832",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::TargetNotFound);
}

#[tokio::test]
async fn super_admin_targets_are_never_impersonable() {
    let f = fixture().await;
    let (other_admin, _) = f
        .app
        .seed_super_admin("colleague@platform.test", true, true)
        .await;
    let org = f.app.store().find_org_by_id(f.tenant_id).await.unwrap().unwrap();
    let other_user = f
        .app
        .store()
        .find_user_by_id(other_admin.user_id)
        .await
        .unwrap()
        .unwrap();
    f.app.seed_membership(&other_user, &org, "owner").await;

    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            other_admin.user_id,
            f.tenant_id,
            "this must fail regardless of membership",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::CannotImpersonateSuperAdmin);
}

#[tokio::test]
async fn target_without_membership_is_rejected() {
    let f = fixture().await;
    let other_org = f.app.seed_org("globex").await;

    let err = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            other_org.organization_id,
            "wrong tenant",
            &request_meta(),
        )
        .await
        .unwrap_err();
    expect_code(err, ImpersonationErrorCode::NoTenantAccess);
}

#[tokio::test]
async fn session_is_capped_at_exactly_one_hour() {
    let f = fixture().await;

    let (session, _) = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "verifying payout settings",
            &request_meta(),
        )
        .await
        .unwrap();

    assert_eq!(
        session.expiry_utc - session.created_utc,
        Duration::minutes(IMPERSONATION_DURATION_MINUTES)
    );
}

#[tokio::test]
async fn token_carries_target_identity_and_impersonator_block() {
    let f = fixture().await;

    let (session, token) = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "reviewing a survey report",
            &request_meta(),
        )
        .await
        .unwrap();

    let claims = f.app.state.tokens.verify(&token).unwrap();
    assert_eq!(claims.sub, f.target_id);
    assert_eq!(claims.sid, session.impersonation_id);
    assert_eq!(claims.org_id, Some(f.tenant_id));
    assert!(f.app.state.impersonations.is_impersonation_token(&claims));

    let impersonator = claims.impersonator.unwrap();
    assert_eq!(impersonator.user_id, f.admin_id);
    assert_eq!(impersonator.session_id, f.admin_session_id);

    // Audit entry records reason, target email, and expiry
    let entries = f
        .app
        .state
        .super_admins
        .list_audit_entries(Some(f.tenant_id), 10)
        .await
        .unwrap();
    let entry = entries
        .iter()
        .find(|e| e.action == "impersonation.start")
        .expect("audit entry present");
    let after = entry.after_value.as_ref().unwrap();
    assert_eq!(after["target_email"], "creator@example.com");
    assert_eq!(after["reason"], "reviewing a survey report");
}

#[tokio::test]
async fn starting_a_new_session_ends_the_prior_one() {
    let f = fixture().await;

    let (first, _) = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "first look",
            &request_meta(),
        )
        .await
        .unwrap();
    let (second, _) = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "second look",
            &request_meta(),
        )
        .await
        .unwrap();

    let first = f
        .app
        .state
        .impersonations
        .validate_impersonation_session(first.impersonation_id)
        .await
        .unwrap();
    assert!(first.is_none());

    let ended = f
        .app
        .store()
        .find_impersonation_session(second.impersonation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(ended.is_active());
}

#[tokio::test]
async fn end_impersonation_is_idempotent() {
    let f = fixture().await;

    let (session, _) = f
        .app
        .state
        .impersonations
        .start_impersonation(
            f.admin_id,
            f.admin_session_id,
            f.target_id,
            f.tenant_id,
            "short visit",
            &request_meta(),
        )
        .await
        .unwrap();

    f.app
        .state
        .impersonations
        .end_impersonation(session.impersonation_id, end_reason::MANUAL, Some(f.admin_id))
        .await
        .unwrap();
    // Second end is a no-op, not an error
    f.app
        .state
        .impersonations
        .end_impersonation(session.impersonation_id, end_reason::MANUAL, Some(f.admin_id))
        .await
        .unwrap();

    let stored = f
        .app
        .store()
        .find_impersonation_session(session.impersonation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.end_reason.as_deref(), Some(end_reason::MANUAL));

    assert!(f
        .app
        .state
        .impersonations
        .validate_impersonation_session(session.impersonation_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn cleanup_marks_lapsed_sessions_expired() {
    let f = fixture().await;

    let mut stale = ImpersonationSession::new(
        f.admin_id,
        f.admin_session_id,
        f.target_id,
        f.tenant_id,
        "left running".to_string(),
        &request_meta(),
    );
    stale.expiry_utc = Utc::now() - Duration::minutes(5);
    f.app
        .store()
        .replace_impersonation_session(&stale)
        .await
        .unwrap();

    let ended = f
        .app
        .state
        .impersonations
        .cleanup_expired_impersonation_sessions()
        .await
        .unwrap();
    assert_eq!(ended, 1);

    let stored = f
        .app
        .store()
        .find_impersonation_session(stale.impersonation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.end_reason.as_deref(), Some(end_reason::EXPIRED));

    // Re-running the sweep is a no-op
    assert_eq!(
        f.app
            .state
            .impersonations
            .cleanup_expired_impersonation_sessions()
            .await
            .unwrap(),
        0
    );
}
