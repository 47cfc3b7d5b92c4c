//! Test helpers for identity-service integration tests.
//!
//! Builds the full service graph over the in-memory store so suites
//! run without external services.

#![allow(dead_code)]

use identity_service::{
    config::{
        DatabaseConfig, Environment, FeatureFlags, IdentityConfig, RateLimitConfig,
        SecurityConfig, SmtpConfig, SuperAdminConfig, TokenConfig,
    },
    models::{Membership, Organization, RequestMeta, SuperAdminUser, User},
    services::MockEmailService,
    store::{IdentityStore, MemoryStore},
    utils::{hash_password, Password},
    AppState,
};
use secrecy::Secret;
use std::sync::Arc;

pub const TEST_SIGNING_SECRET: &str = "test-signing-secret-0123456789abcdef";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "debug".to_string(),
        base_url: "http://localhost:3000".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        token: TokenConfig {
            signing_secret: Secret::new(TEST_SIGNING_SECRET.to_string()),
            token_expiry_days: 7,
            session_lifetime_days: 30,
        },
        super_admin: SuperAdminConfig {
            session_lifetime_hours: 4,
            inactivity_timeout_minutes: 30,
            mfa_challenge_minutes: 5,
        },
        magic_link_hours: 24,
        invitation_days: 7,
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            user: String::new(),
            password: String::new(),
            from: "no-reply@localhost".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            cookie_domain: "localhost".to_string(),
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            magic_link_attempts: 1000,
            magic_link_window_seconds: 60,
            admin_login_attempts: 1000,
            admin_login_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
        features: FeatureFlags {
            magic_link_login: true,
            impersonation: true,
        },
    }
}

/// Test application over the in-memory store.
pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::build(
            test_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(MockEmailService),
        );
        TestApp { state }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.state.store
    }

    pub async fn seed_user(&self, email: &str) -> User {
        let user = User::new(email.to_string(), None, "member".to_string());
        self.store().insert_user(&user).await.unwrap();
        user
    }

    pub async fn seed_user_with_password(&self, email: &str) -> User {
        let mut user = User::new(email.to_string(), None, "member".to_string());
        let hash = hash_password(&Password::new(TEST_PASSWORD.to_string())).unwrap();
        user.password_hash = Some(hash.into_string());
        user.email_verified = true;
        self.store().insert_user(&user).await.unwrap();
        user
    }

    pub async fn seed_org(&self, slug: &str) -> Organization {
        let org = Organization::new(slug.to_string(), slug.to_uppercase());
        self.store().insert_organization(&org).await.unwrap();
        org
    }

    pub async fn seed_membership(&self, user: &User, org: &Organization, role: &str) -> Membership {
        let membership = Membership::new(user.user_id, org.organization_id, role.to_string());
        self.store().insert_membership(&membership).await.unwrap();
        membership
    }

    /// Seed a password-bearing user with an active super admin record.
    pub async fn seed_super_admin(
        &self,
        email: &str,
        can_impersonate: bool,
        can_manage_super_admins: bool,
    ) -> (User, SuperAdminUser) {
        let user = self.seed_user_with_password(email).await;
        let mut admin = SuperAdminUser::new(user.user_id, None);
        admin.can_impersonate = can_impersonate;
        admin.can_manage_super_admins = can_manage_super_admins;
        self.store().insert_super_admin(&admin).await.unwrap();
        (user, admin)
    }
}

pub fn request_meta() -> RequestMeta {
    RequestMeta {
        ip: Some("198.51.100.7".to_string()),
        user_agent: Some("integration-tests".to_string()),
    }
}

/// A super admin whose session is already MFA-verified, ready for
/// sensitive operations.
pub async fn verified_admin_session(
    app: &TestApp,
    email: &str,
    can_impersonate: bool,
    can_manage: bool,
) -> (User, identity_service::models::SuperAdminSession, String) {
    let (user, _) = app.seed_super_admin(email, can_impersonate, can_manage).await;
    let (session, token) = app
        .state
        .super_admins
        .create_session(user.user_id, &request_meta())
        .await
        .unwrap();
    app.state
        .super_admins
        .mark_mfa_verified(session.session_id)
        .await
        .unwrap();
    (user, session, token)
}
