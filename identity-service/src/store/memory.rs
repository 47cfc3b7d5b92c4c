//! In-memory record store.
//!
//! Backs the test suite and local experimentation. Every operation
//! takes the single inner lock, so the transactional store methods are
//! atomic here by construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::IdentityStore;
use crate::models::{
    impersonation::end_reason, super_admin::revoke_reason, AuditLogEntry, CustomRole,
    ImpersonationSession, Invitation, InvitationState, IpAllowlistEntry, MagicLink, Membership,
    Organization, RateLimitWindow, Session, SuperAdminSession, SuperAdminUser, User, UserTenant,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    memberships: Vec<Membership>,
    sessions: HashMap<Uuid, Session>,
    super_admins: HashMap<Uuid, SuperAdminUser>,
    super_admin_sessions: HashMap<Uuid, SuperAdminSession>,
    impersonation_sessions: HashMap<Uuid, ImpersonationSession>,
    audit_log: Vec<AuditLogEntry>,
    rate_limit_windows: HashMap<(Uuid, String), RateLimitWindow>,
    ip_allowlist: Vec<IpAllowlistEntry>,
    magic_links: HashMap<Uuid, MagicLink>,
    invitations: HashMap<Uuid, Invitation>,
    custom_roles: HashMap<Uuid, CustomRole>,
}

/// In-memory store over a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // ==================== Users ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.to_lowercase() == needle)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        self.lock().users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_user_state(&self, user_id: Uuid, state_code: &str) -> Result<(), AppError> {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.user_state_code = state_code.to_string();
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), AppError> {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.email_verified = true;
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn update_user_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.last_login_utc = Some(at);
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    // ==================== Organizations ====================

    async fn find_org_by_id(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, AppError> {
        Ok(self.lock().organizations.get(&organization_id).cloned())
    }

    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<Organization>, AppError> {
        Ok(self
            .lock()
            .organizations
            .values()
            .find(|o| o.org_slug == slug)
            .cloned())
    }

    async fn insert_organization(&self, org: &Organization) -> Result<(), AppError> {
        self.lock()
            .organizations
            .insert(org.organization_id, org.clone());
        Ok(())
    }

    // ==================== Memberships ====================

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        Ok(self
            .lock()
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
            .cloned())
    }

    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, AppError> {
        let inner = self.lock();
        let mut tenants: Vec<UserTenant> = inner
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                inner
                    .organizations
                    .get(&m.organization_id)
                    .map(|o| UserTenant {
                        membership: m.clone(),
                        organization: o.clone(),
                    })
            })
            .collect();
        tenants.sort_by_key(|t| t.membership.created_utc);
        Ok(tenants)
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError> {
        self.lock().memberships.push(membership.clone());
        Ok(())
    }

    async fn delete_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        self.lock()
            .memberships
            .retain(|m| !(m.user_id == user_id && m.organization_id == organization_id));
        Ok(())
    }

    async fn set_default_tenant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        for m in inner.memberships.iter_mut().filter(|m| m.user_id == user_id) {
            m.is_default = m.organization_id == organization_id;
        }
        Ok(())
    }

    async fn update_membership_last_active(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(m) = inner
            .memberships
            .iter_mut()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
        {
            m.last_active_utc = Some(at);
        }
        Ok(())
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        self.lock()
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, AppError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.lock().sessions.get(&session_id).cloned())
    }

    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(session) = self.lock().sessions.get_mut(&session_id) {
            if session.revoked_utc.is_none() {
                session.revoked_utc = Some(at);
            }
        }
        Ok(())
    }

    async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut revoked = 0;
        for session in self
            .lock()
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.revoked_utc.is_none())
        {
            session.revoked_utc = Some(at);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn update_session_org(
        &self,
        session_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        if let Some(session) = self.lock().sessions.get_mut(&session_id) {
            session.organization_id = Some(organization_id);
        }
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.expiry_utc > now);
        Ok((before - inner.sessions.len()) as u64)
    }

    // ==================== Super Admins ====================

    async fn find_super_admin(&self, user_id: Uuid) -> Result<Option<SuperAdminUser>, AppError> {
        Ok(self.lock().super_admins.get(&user_id).cloned())
    }

    async fn count_active_super_admins(&self) -> Result<i64, AppError> {
        Ok(self
            .lock()
            .super_admins
            .values()
            .filter(|a| a.is_active)
            .count() as i64)
    }

    async fn insert_super_admin(&self, admin: &SuperAdminUser) -> Result<(), AppError> {
        self.lock().super_admins.insert(admin.user_id, admin.clone());
        Ok(())
    }

    async fn set_super_admin_active(
        &self,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<(), AppError> {
        if let Some(admin) = self.lock().super_admins.get_mut(&user_id) {
            admin.is_active = is_active;
        }
        Ok(())
    }

    async fn update_super_admin_last_access_ip(
        &self,
        user_id: Uuid,
        ip: &str,
    ) -> Result<(), AppError> {
        if let Some(admin) = self.lock().super_admins.get_mut(&user_id) {
            admin.last_access_ip = Some(ip.to_string());
        }
        Ok(())
    }

    // ==================== Super Admin Sessions ====================

    async fn replace_super_admin_session(
        &self,
        session: &SuperAdminSession,
    ) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut revoked = 0;
        for s in inner
            .super_admin_sessions
            .values_mut()
            .filter(|s| s.user_id == session.user_id && s.revoked_utc.is_none())
        {
            s.revoked_utc = Some(now);
            s.revoked_reason = Some(revoke_reason::SUPERSEDED.to_string());
            revoked += 1;
        }
        inner
            .super_admin_sessions
            .insert(session.session_id, session.clone());
        Ok(revoked)
    }

    async fn find_super_admin_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SuperAdminSession>, AppError> {
        Ok(self
            .lock()
            .super_admin_sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn find_super_admin_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SuperAdminSession>, AppError> {
        Ok(self.lock().super_admin_sessions.get(&session_id).cloned())
    }

    async fn revoke_super_admin_session(
        &self,
        session_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(session) = self.lock().super_admin_sessions.get_mut(&session_id) {
            if session.revoked_utc.is_none() {
                session.revoked_utc = Some(at);
                session.revoked_reason = Some(reason.to_string());
            }
        }
        Ok(())
    }

    async fn revoke_super_admin_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut revoked = 0;
        for session in self
            .lock()
            .super_admin_sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.revoked_utc.is_none())
        {
            session.revoked_utc = Some(at);
            session.revoked_reason = Some(reason.to_string());
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn set_mfa_challenge(
        &self,
        session_id: Uuid,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(session) = self.lock().super_admin_sessions.get_mut(&session_id) {
            session.mfa_challenge_expiry_utc = Some(expiry);
        }
        Ok(())
    }

    async fn mark_mfa_verified(&self, session_id: Uuid) -> Result<(), AppError> {
        if let Some(session) = self.lock().super_admin_sessions.get_mut(&session_id) {
            session.mfa_verified = true;
        }
        Ok(())
    }

    async fn touch_super_admin_session(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(session) = self.lock().super_admin_sessions.get_mut(&session_id) {
            session.last_activity_utc = at;
        }
        Ok(())
    }

    // ==================== Impersonation ====================

    async fn replace_impersonation_session(
        &self,
        session: &ImpersonationSession,
    ) -> Result<u64, AppError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut ended = 0;
        for s in inner
            .impersonation_sessions
            .values_mut()
            .filter(|s| s.super_admin_id == session.super_admin_id && s.ended_utc.is_none())
        {
            s.ended_utc = Some(now);
            s.end_reason = Some(end_reason::SUPERSEDED.to_string());
            ended += 1;
        }
        inner
            .impersonation_sessions
            .insert(session.impersonation_id, session.clone());
        Ok(ended)
    }

    async fn find_impersonation_session(
        &self,
        impersonation_id: Uuid,
    ) -> Result<Option<ImpersonationSession>, AppError> {
        Ok(self
            .lock()
            .impersonation_sessions
            .get(&impersonation_id)
            .cloned())
    }

    async fn end_impersonation_session(
        &self,
        impersonation_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if let Some(session) = self.lock().impersonation_sessions.get_mut(&impersonation_id) {
            if session.ended_utc.is_none() {
                session.ended_utc = Some(at);
                session.end_reason = Some(reason.to_string());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn end_expired_impersonation_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut ended = 0;
        for session in self
            .lock()
            .impersonation_sessions
            .values_mut()
            .filter(|s| s.ended_utc.is_none() && s.expiry_utc <= now)
        {
            session.ended_utc = Some(now);
            session.end_reason = Some(end_reason::EXPIRED.to_string());
            ended += 1;
        }
        Ok(ended)
    }

    // ==================== Audit Log ====================

    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        self.lock().audit_log.push(entry.clone());
        Ok(())
    }

    async fn list_audit_entries(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        let inner = self.lock();
        let mut entries: Vec<AuditLogEntry> = inner
            .audit_log
            .iter()
            .filter(|e| tenant_id.is_none() || e.tenant_id == tenant_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    // ==================== Rate Limiting & IP Allowlist ====================

    async fn find_rate_limit_window(
        &self,
        user_id: Uuid,
        bucket: &str,
    ) -> Result<Option<RateLimitWindow>, AppError> {
        Ok(self
            .lock()
            .rate_limit_windows
            .get(&(user_id, bucket.to_string()))
            .cloned())
    }

    async fn put_rate_limit_window(&self, window: &RateLimitWindow) -> Result<(), AppError> {
        self.lock()
            .rate_limit_windows
            .insert((window.user_id, window.bucket.clone()), window.clone());
        Ok(())
    }

    async fn list_ip_allowlist(&self) -> Result<Vec<IpAllowlistEntry>, AppError> {
        Ok(self.lock().ip_allowlist.clone())
    }

    async fn insert_ip_allowlist_entry(&self, entry: &IpAllowlistEntry) -> Result<(), AppError> {
        self.lock().ip_allowlist.push(entry.clone());
        Ok(())
    }

    // ==================== Magic Links ====================

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<(), AppError> {
        self.lock()
            .magic_links
            .insert(link.magic_link_id, link.clone());
        Ok(())
    }

    async fn find_magic_link(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<MagicLink>, AppError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .lock()
            .magic_links
            .values()
            .find(|l| l.email.to_lowercase() == needle && l.token_hash == token_hash)
            .cloned())
    }

    async fn consume_magic_link(
        &self,
        magic_link_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if let Some(link) = self.lock().magic_links.get_mut(&magic_link_id) {
            if link.consumed_utc.is_none() {
                link.consumed_utc = Some(at);
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ==================== Invitations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError> {
        self.lock()
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, AppError> {
        Ok(self.lock().invitations.get(&invitation_id).cloned())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, AppError> {
        Ok(self
            .lock()
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn find_pending_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, AppError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .lock()
            .invitations
            .values()
            .find(|i| {
                i.organization_id == organization_id
                    && i.email.to_lowercase() == needle
                    && i.state_code == InvitationState::Pending.as_str()
            })
            .cloned())
    }

    async fn rotate_invitation_token(
        &self,
        invitation_id: Uuid,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(invitation) = self.lock().invitations.get_mut(&invitation_id) {
            invitation.token_hash = token_hash.to_string();
            invitation.expiry_utc = expiry;
        }
        Ok(())
    }

    async fn mark_invitation_accepted(
        &self,
        invitation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(invitation) = self.lock().invitations.get_mut(&invitation_id) {
            invitation.state_code = InvitationState::Accepted.as_str().to_string();
            invitation.accepted_utc = Some(at);
        }
        Ok(())
    }

    // ==================== Custom Roles ====================

    async fn find_custom_role(&self, role_id: Uuid) -> Result<Option<CustomRole>, AppError> {
        Ok(self.lock().custom_roles.get(&role_id).cloned())
    }

    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), AppError> {
        self.lock().custom_roles.insert(role.role_id, role.clone());
        Ok(())
    }
}
