//! Record store seam for the identity service.
//!
//! All persistence goes through the `IdentityStore` trait; the service
//! layer never talks to a database driver directly. `PgStore` is the
//! production implementation, `MemoryStore` backs the test suite.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AuditLogEntry, CustomRole, ImpersonationSession, Invitation, IpAllowlistEntry, MagicLink,
    Membership, Organization, RateLimitWindow, Session, SuperAdminSession, SuperAdminUser, User,
    UserTenant,
};

/// Abstract record store.
///
/// Lookup misses are `Ok(None)`; store faults are errors. The
/// `replace_*` methods implement revoke-then-create atomically so there
/// is no window in which two sessions are simultaneously valid.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Probe the backing store.
    async fn health_check(&self) -> Result<(), AppError>;

    // ==================== Users ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// Case-insensitive email lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    async fn update_user_state(&self, user_id: Uuid, state_code: &str) -> Result<(), AppError>;

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError>;

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn update_user_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ==================== Organizations ====================

    async fn find_org_by_id(&self, organization_id: Uuid)
        -> Result<Option<Organization>, AppError>;

    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<Organization>, AppError>;

    async fn insert_organization(&self, org: &Organization) -> Result<(), AppError>;

    // ==================== Memberships ====================

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, AppError>;

    /// Memberships joined with their organizations.
    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, AppError>;

    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError>;

    async fn delete_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError>;

    /// Clear any prior default and set the new one, atomically.
    async fn set_default_tenant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError>;

    async fn update_membership_last_active(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), AppError>;

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, AppError>;

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, AppError>;

    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn revoke_all_sessions(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, AppError>;

    async fn update_session_org(
        &self,
        session_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    // ==================== Super Admins ====================

    async fn find_super_admin(&self, user_id: Uuid) -> Result<Option<SuperAdminUser>, AppError>;

    async fn count_active_super_admins(&self) -> Result<i64, AppError>;

    async fn insert_super_admin(&self, admin: &SuperAdminUser) -> Result<(), AppError>;

    async fn set_super_admin_active(&self, user_id: Uuid, is_active: bool)
        -> Result<(), AppError>;

    async fn update_super_admin_last_access_ip(
        &self,
        user_id: Uuid,
        ip: &str,
    ) -> Result<(), AppError>;

    // ==================== Super Admin Sessions ====================

    /// Revoke all prior sessions for the user (reason
    /// `new_session_started`) and insert the new one, in a single
    /// transaction. Returns the number of sessions revoked.
    async fn replace_super_admin_session(
        &self,
        session: &SuperAdminSession,
    ) -> Result<u64, AppError>;

    async fn find_super_admin_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SuperAdminSession>, AppError>;

    async fn find_super_admin_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SuperAdminSession>, AppError>;

    async fn revoke_super_admin_session(
        &self,
        session_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn revoke_super_admin_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    async fn set_mfa_challenge(
        &self,
        session_id: Uuid,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_mfa_verified(&self, session_id: Uuid) -> Result<(), AppError>;

    async fn touch_super_admin_session(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ==================== Impersonation ====================

    /// End any active impersonation sessions for the same super admin
    /// (reason `new_session_started`) and insert the new one, in a
    /// single transaction. Returns the number of sessions ended.
    async fn replace_impersonation_session(
        &self,
        session: &ImpersonationSession,
    ) -> Result<u64, AppError>;

    async fn find_impersonation_session(
        &self,
        impersonation_id: Uuid,
    ) -> Result<Option<ImpersonationSession>, AppError>;

    /// Idempotent: returns true only if the session was still open.
    async fn end_impersonation_session(
        &self,
        impersonation_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn end_expired_impersonation_sessions(&self, now: DateTime<Utc>)
        -> Result<u64, AppError>;

    // ==================== Audit Log ====================

    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<(), AppError>;

    async fn list_audit_entries(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError>;

    // ==================== Rate Limiting & IP Allowlist ====================

    async fn find_rate_limit_window(
        &self,
        user_id: Uuid,
        bucket: &str,
    ) -> Result<Option<RateLimitWindow>, AppError>;

    /// Insert or overwrite the (user, bucket) window.
    async fn put_rate_limit_window(&self, window: &RateLimitWindow) -> Result<(), AppError>;

    async fn list_ip_allowlist(&self) -> Result<Vec<IpAllowlistEntry>, AppError>;

    async fn insert_ip_allowlist_entry(&self, entry: &IpAllowlistEntry) -> Result<(), AppError>;

    // ==================== Magic Links ====================

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<(), AppError>;

    async fn find_magic_link(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<MagicLink>, AppError>;

    /// Single-use guard: returns true only if the link had not been
    /// consumed before.
    async fn consume_magic_link(
        &self,
        magic_link_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    // ==================== Invitations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError>;

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, AppError>;

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, AppError>;

    async fn find_pending_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, AppError>;

    async fn rotate_invitation_token(
        &self,
        invitation_id: Uuid,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_invitation_accepted(
        &self,
        invitation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ==================== Custom Roles ====================

    async fn find_custom_role(&self, role_id: Uuid) -> Result<Option<CustomRole>, AppError>;

    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), AppError>;
}
