//! Invitation lifecycle: issue, duplicate protection, resend rotation,
//! acceptance.

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use identity_service::models::{InvitationState, UserState};
use identity_service::services::IdentityError;

#[tokio::test]
async fn create_pre_provisions_an_invited_user() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    let (invitation, _token) = app
        .state
        .invitations
        .create_invitation(org.organization_id, "new@example.com", "member", inviter.user_id)
        .await
        .unwrap();

    assert_eq!(invitation.state_code, InvitationState::Pending.as_str());

    let user = app
        .store()
        .find_user_by_email("new@example.com")
        .await
        .unwrap()
        .expect("pre-provisioned user");
    assert_eq!(user.user_state_code, UserState::Invited.as_str());
}

#[tokio::test]
async fn duplicate_pending_invitation_is_a_conflict() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    app.state
        .invitations
        .create_invitation(org.organization_id, "dup@example.com", "member", inviter.user_id)
        .await
        .unwrap();

    let err = app
        .state
        .invitations
        .create_invitation(org.organization_id, "Dup@Example.com", "member", inviter.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

#[tokio::test]
async fn accept_activates_user_and_creates_membership() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    let (_, raw_token) = app
        .state
        .invitations
        .create_invitation(org.organization_id, "joiner@example.com", "admin", inviter.user_id)
        .await
        .unwrap();

    let (user, membership) = app
        .state
        .invitations
        .accept_invitation(&raw_token, Some("Joiner".to_string()), None)
        .await
        .unwrap();

    assert!(user.is_active());
    assert!(user.email_verified);
    assert_eq!(membership.organization_id, org.organization_id);
    assert_eq!(membership.role_code, "admin");

    // The invitation is spent
    let err = app
        .state
        .invitations
        .accept_invitation(&raw_token, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));
}

#[tokio::test]
async fn accept_with_password_enables_password_login() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    let (_, raw_token) = app
        .state
        .invitations
        .create_invitation(org.organization_id, "pw@example.com", "member", inviter.user_id)
        .await
        .unwrap();

    let (user, _) = app
        .state
        .invitations
        .accept_invitation(&raw_token, None, Some("a long enough password".to_string()))
        .await
        .unwrap();

    assert!(app
        .state
        .credentials
        .verify_password(&user, "a long enough password"));
}

#[tokio::test]
async fn expired_invitations_cannot_be_accepted() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    let (invitation, raw_token) = app
        .state
        .invitations
        .create_invitation(org.organization_id, "slow@example.com", "member", inviter.user_id)
        .await
        .unwrap();

    app.store()
        .rotate_invitation_token(
            invitation.invitation_id,
            &invitation.token_hash,
            Utc::now() - Duration::days(1),
        )
        .await
        .unwrap();

    let err = app
        .state
        .invitations
        .accept_invitation(&raw_token, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));
}

#[tokio::test]
async fn resend_rotates_the_token_and_expiry() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;
    let inviter = app.seed_user("owner@example.com").await;

    let (invitation, old_token) = app
        .state
        .invitations
        .create_invitation(org.organization_id, "again@example.com", "member", inviter.user_id)
        .await
        .unwrap();

    let (_, new_token) = app
        .state
        .invitations
        .resend_invitation(invitation.invitation_id, inviter.user_id)
        .await
        .unwrap();
    assert_ne!(old_token, new_token);

    // The old token stops working; the new one accepts
    let err = app
        .state
        .invitations
        .accept_invitation(&old_token, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::NotFound(_)));

    let (user, _) = app
        .state
        .invitations
        .accept_invitation(&new_token, None, None)
        .await
        .unwrap();
    assert_eq!(user.email, "again@example.com");
}
