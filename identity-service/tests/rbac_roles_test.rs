//! Custom role resolution: tenant scoping, predefined-role
//! inheritance, and the cross-tenant guard.

mod common;

use common::TestApp;
use identity_service::models::CustomRole;
use identity_service::services::rbac;

#[tokio::test]
async fn custom_role_inherits_from_predefined_parent() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;

    // "support" extends member with one extra permission
    let role = CustomRole::new(
        org.organization_id,
        "Support".to_string(),
        Some("member".to_string()),
        vec!["orders.refund".to_string()],
    );
    app.store().insert_custom_role(&role).await.unwrap();

    let permissions = app
        .state
        .roles
        .permissions_for_role(org.organization_id, &role.role_id.to_string())
        .await
        .unwrap();

    assert!(rbac::has_permission(&permissions, "orders.refund"));
    // Inherited from member
    assert!(rbac::has_permission(&permissions, "orders.view"));
    assert!(!rbac::has_permission(&permissions, "orders.edit"));
}

#[tokio::test]
async fn custom_role_chain_merges_without_duplicates() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;

    let base = CustomRole::new(
        org.organization_id,
        "Base".to_string(),
        None,
        vec!["surveys.view".to_string(), "orders.view".to_string()],
    );
    app.store().insert_custom_role(&base).await.unwrap();

    let child = CustomRole::new(
        org.organization_id,
        "Child".to_string(),
        Some(base.role_id.to_string()),
        vec!["orders.view".to_string(), "orders.export".to_string()],
    );
    app.store().insert_custom_role(&child).await.unwrap();

    let permissions = app
        .state
        .roles
        .permissions_for_role(org.organization_id, &child.role_id.to_string())
        .await
        .unwrap();

    assert_eq!(
        permissions,
        vec!["orders.view", "orders.export", "surveys.view"]
    );
}

#[tokio::test]
async fn cross_tenant_role_references_grant_nothing() {
    let app = TestApp::new();
    let acme = app.seed_org("acme").await;
    let globex = app.seed_org("globex").await;

    let role = CustomRole::new(
        acme.organization_id,
        "Acme Only".to_string(),
        None,
        vec!["orders.*".to_string()],
    );
    app.store().insert_custom_role(&role).await.unwrap();

    // Resolving the acme role within globex fails closed
    let permissions = app
        .state
        .roles
        .permissions_for_role(globex.organization_id, &role.role_id.to_string())
        .await
        .unwrap();
    assert!(permissions.is_empty());
    assert!(!rbac::has_permission(&permissions, "orders.view"));
}

#[tokio::test]
async fn unknown_role_codes_resolve_to_nothing() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;

    let permissions = app
        .state
        .roles
        .permissions_for_role(org.organization_id, "no-such-role")
        .await
        .unwrap();
    assert!(permissions.is_empty());
}

#[tokio::test]
async fn inheritance_cycles_terminate() {
    let app = TestApp::new();
    let org = app.seed_org("acme").await;

    let a_id = uuid::Uuid::new_v4();
    let b_id = uuid::Uuid::new_v4();
    let mut a = CustomRole::new(
        org.organization_id,
        "A".to_string(),
        Some(b_id.to_string()),
        vec!["orders.view".to_string()],
    );
    a.role_id = a_id;
    let mut b = CustomRole::new(
        org.organization_id,
        "B".to_string(),
        Some(a_id.to_string()),
        vec!["surveys.view".to_string()],
    );
    b.role_id = b_id;
    app.store().insert_custom_role(&a).await.unwrap();
    app.store().insert_custom_role(&b).await.unwrap();

    let permissions = app
        .state
        .roles
        .permissions_for_role(org.organization_id, &a_id.to_string())
        .await
        .unwrap();

    // Both sets merged exactly once, no hang
    assert!(rbac::has_permission(&permissions, "orders.view"));
    assert!(rbac::has_permission(&permissions, "surveys.view"));
    assert_eq!(permissions.len(), 2);
}
