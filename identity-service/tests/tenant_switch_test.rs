//! Tenant context switching, default tenant selection, and the
//! welcome-modal predicate.

mod common;

use common::{request_meta, TestApp};
use identity_service::services::IdentityError;

#[tokio::test]
async fn switch_requires_membership_and_issues_no_token() {
    let app = TestApp::new();
    let user = app.seed_user("solo@example.com").await;
    let home = app.seed_org("home").await;
    app.seed_membership(&user, &home, "owner").await;
    app.seed_org("elsewhere").await;

    let (session, _) = app
        .state
        .sessions
        .create_session(user.user_id, Some(home.organization_id), &request_meta())
        .await
        .unwrap();

    let err = app
        .state
        .tenants
        .switch_tenant_context(user.user_id, "elsewhere", session.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::TenantAccess(_)));

    // Session still points at the original organization
    let session = app
        .store()
        .find_session_by_id(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.organization_id, Some(home.organization_id));
}

#[tokio::test]
async fn switch_rejects_suspended_organizations() {
    let app = TestApp::new();
    let user = app.seed_user("switcher@example.com").await;
    let home = app.seed_org("homebase").await;
    app.seed_membership(&user, &home, "owner").await;

    let mut frozen = app.seed_org("frozen").await;
    frozen.org_state_code = "suspended".to_string();
    app.store().insert_organization(&frozen).await.unwrap();
    app.seed_membership(&user, &frozen, "member").await;

    let (session, _) = app
        .state
        .sessions
        .create_session(user.user_id, Some(home.organization_id), &request_meta())
        .await
        .unwrap();

    let err = app
        .state
        .tenants
        .switch_tenant_context(user.user_id, "frozen", session.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::TenantAccess(_)));
}

#[tokio::test]
async fn switch_reissues_token_and_moves_session_pointer() {
    let app = TestApp::new();
    let user = app.seed_user("multi@example.com").await;
    let acme = app.seed_org("acme").await;
    let globex = app.seed_org("globex").await;
    app.seed_membership(&user, &acme, "owner").await;
    app.seed_membership(&user, &globex, "member").await;

    let (session, _) = app
        .state
        .sessions
        .create_session(user.user_id, Some(acme.organization_id), &request_meta())
        .await
        .unwrap();

    let (token, active) = app
        .state
        .tenants
        .switch_tenant_context(
            user.user_id,
            "globex",
            session.session_id,
            Some("198.51.100.7".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(active.org_slug, "globex");
    assert_eq!(active.role_code, "member");

    // Token is scoped to the new org with the full accessible list
    let claims = app.state.tokens.verify(&token).unwrap();
    assert_eq!(claims.org.as_deref(), Some("globex"));
    assert_eq!(claims.role.as_deref(), Some("member"));
    assert_eq!(claims.orgs.len(), 2);

    // Session pointer and membership activity moved
    let session = app
        .store()
        .find_session_by_id(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.organization_id, Some(globex.organization_id));

    let membership = app
        .store()
        .find_membership(user.user_id, globex.organization_id)
        .await
        .unwrap()
        .unwrap();
    assert!(membership.last_active_utc.is_some());

    // The switch is audited
    let entries = app
        .state
        .super_admins
        .list_audit_entries(Some(globex.organization_id), 10)
        .await
        .unwrap();
    assert!(entries.iter().any(|e| e.action == "tenant.switched"));
}

#[tokio::test]
async fn default_tenant_is_exclusive() {
    let app = TestApp::new();
    let user = app.seed_user("default@example.com").await;
    let acme = app.seed_org("acme").await;
    let globex = app.seed_org("globex").await;
    app.seed_membership(&user, &acme, "owner").await;
    app.seed_membership(&user, &globex, "member").await;

    app.state
        .tenants
        .set_default_tenant(user.user_id, acme.organization_id)
        .await
        .unwrap();
    app.state
        .tenants
        .set_default_tenant(user.user_id, globex.organization_id)
        .await
        .unwrap();

    let default = app
        .state
        .tenants
        .get_default_tenant(user.user_id)
        .await
        .unwrap()
        .expect("a default tenant");
    assert_eq!(
        default.organization.organization_id,
        globex.organization_id
    );

    // Exactly one default
    let defaults = app
        .state
        .tenants
        .get_user_tenants(user.user_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.membership.is_default)
        .count();
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn set_default_requires_membership() {
    let app = TestApp::new();
    let user = app.seed_user("nomember@example.com").await;
    let org = app.seed_org("acme").await;

    let err = app
        .state
        .tenants
        .set_default_tenant(user.user_id, org.organization_id)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::TenantAccess(_)));
}

#[tokio::test]
async fn welcome_modal_shows_only_for_undecided_multi_org_users() {
    let app = TestApp::new();
    let user = app.seed_user("welcome@example.com").await;
    let acme = app.seed_org("acme").await;
    app.seed_membership(&user, &acme, "owner").await;

    // One org: no modal
    assert!(!app
        .state
        .tenants
        .should_show_welcome_modal(user.user_id)
        .await
        .unwrap());

    // Two orgs, no default: modal
    let globex = app.seed_org("globex").await;
    app.seed_membership(&user, &globex, "member").await;
    assert!(app
        .state
        .tenants
        .should_show_welcome_modal(user.user_id)
        .await
        .unwrap());

    // Default picked: no modal
    app.state
        .tenants
        .set_default_tenant(user.user_id, acme.organization_id)
        .await
        .unwrap();
    assert!(!app
        .state
        .tenants
        .should_show_welcome_modal(user.user_id)
        .await
        .unwrap());
}
