//! PostgreSQL record store.
//!
//! Runtime-bound queries over a `PgPool`; one method per store
//! operation, grouped by entity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::IdentityStore;
use crate::models::{
    AuditLogEntry, CustomRole, ImpersonationSession, Invitation, IpAllowlistEntry, MagicLink,
    Membership, Organization, RateLimitWindow, Session, SuperAdminSession, SuperAdminUser, User,
    UserTenant,
};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Users ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, display_name, default_role_code, user_state_code,
                               email_verified, password_hash, last_login_utc, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.default_role_code)
        .bind(&user.user_state_code)
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(user.last_login_utc)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_user_state(&self, user_id: Uuid, state_code: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET user_state_code = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(state_code)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_user_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_utc = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Organizations ====================

    async fn find_org_by_id(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, AppError> {
        sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<Organization>, AppError> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE org_slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_organization(&self, org: &Organization) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO organizations (organization_id, org_slug, org_label, org_state_code, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(org.organization_id)
        .bind(&org.org_slug)
        .bind(&org.org_label)
        .bind(&org.org_state_code)
        .bind(org.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Memberships ====================

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 AND organization_id = $2",
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, AppError> {
        let memberships = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 ORDER BY created_utc",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let org_ids: Vec<Uuid> = memberships.iter().map(|m| m.organization_id).collect();
        let organizations = sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE organization_id = ANY($1)",
        )
        .bind(&org_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        Ok(memberships
            .into_iter()
            .filter_map(|membership| {
                organizations
                    .iter()
                    .find(|o| o.organization_id == membership.organization_id)
                    .cloned()
                    .map(|organization| UserTenant {
                        membership,
                        organization,
                    })
            })
            .collect())
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, user_id, organization_id, role_code,
                                     is_default, last_active_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.user_id)
        .bind(membership.organization_id)
        .bind(&membership.role_code)
        .bind(membership.is_default)
        .bind(membership.last_active_utc)
        .bind(membership.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn delete_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM memberships WHERE user_id = $1 AND organization_id = $2")
            .bind(user_id)
            .bind(organization_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn set_default_tenant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query("UPDATE memberships SET is_default = FALSE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            "UPDATE memberships SET is_default = TRUE WHERE user_id = $1 AND organization_id = $2",
        )
        .bind(user_id)
        .bind(organization_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_membership_last_active(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE memberships SET last_active_utc = $1 WHERE user_id = $2 AND organization_id = $3",
        )
        .bind(at)
        .bind(user_id)
        .bind(organization_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, organization_id, token_hash, expiry_utc,
                                  ip, user_agent, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(session.organization_id)
        .bind(&session.token_hash)
        .bind(session.expiry_utc)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE sessions SET revoked_utc = $1 WHERE session_id = $2 AND revoked_utc IS NULL",
        )
        .bind(at)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = $1 WHERE user_id = $2 AND revoked_utc IS NULL",
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    async fn update_session_org(
        &self,
        session_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET organization_id = $1 WHERE session_id = $2")
            .bind(organization_id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    // ==================== Super Admins ====================

    async fn find_super_admin(&self, user_id: Uuid) -> Result<Option<SuperAdminUser>, AppError> {
        sqlx::query_as::<_, SuperAdminUser>("SELECT * FROM super_admin_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn count_active_super_admins(&self) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM super_admin_users WHERE is_active = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(count)
    }

    async fn insert_super_admin(&self, admin: &SuperAdminUser) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO super_admin_users (user_id, granted_by, can_access_all_tenants,
                                           can_impersonate, can_manage_super_admins, mfa_enabled,
                                           is_active, last_access_ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(admin.user_id)
        .bind(admin.granted_by)
        .bind(admin.can_access_all_tenants)
        .bind(admin.can_impersonate)
        .bind(admin.can_manage_super_admins)
        .bind(admin.mfa_enabled)
        .bind(admin.is_active)
        .bind(&admin.last_access_ip)
        .bind(admin.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn set_super_admin_active(
        &self,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE super_admin_users SET is_active = $1 WHERE user_id = $2")
            .bind(is_active)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_super_admin_last_access_ip(
        &self,
        user_id: Uuid,
        ip: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE super_admin_users SET last_access_ip = $1 WHERE user_id = $2")
            .bind(ip)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Super Admin Sessions ====================

    async fn replace_super_admin_session(
        &self,
        session: &SuperAdminSession,
    ) -> Result<u64, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let revoked = sqlx::query(
            r#"
            UPDATE super_admin_sessions
            SET revoked_utc = NOW(), revoked_reason = 'new_session_started'
            WHERE user_id = $1 AND revoked_utc IS NULL
            "#,
        )
        .bind(session.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO super_admin_sessions (session_id, user_id, token_hash, expiry_utc,
                                              inactivity_timeout_minutes, last_activity_utc,
                                              mfa_verified, mfa_challenge_expiry_utc,
                                              revoked_utc, revoked_reason, ip, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expiry_utc)
        .bind(session.inactivity_timeout_minutes)
        .bind(session.last_activity_utc)
        .bind(session.mfa_verified)
        .bind(session.mfa_challenge_expiry_utc)
        .bind(session.revoked_utc)
        .bind(&session.revoked_reason)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(revoked.rows_affected())
    }

    async fn find_super_admin_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SuperAdminSession>, AppError> {
        sqlx::query_as::<_, SuperAdminSession>(
            "SELECT * FROM super_admin_sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_super_admin_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SuperAdminSession>, AppError> {
        sqlx::query_as::<_, SuperAdminSession>(
            "SELECT * FROM super_admin_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn revoke_super_admin_session(
        &self,
        session_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE super_admin_sessions SET revoked_utc = $1, revoked_reason = $2
            WHERE session_id = $3 AND revoked_utc IS NULL
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn revoke_super_admin_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE super_admin_sessions SET revoked_utc = $1, revoked_reason = $2
            WHERE user_id = $3 AND revoked_utc IS NULL
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    async fn set_mfa_challenge(
        &self,
        session_id: Uuid,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE super_admin_sessions SET mfa_challenge_expiry_utc = $1 WHERE session_id = $2",
        )
        .bind(expiry)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn mark_mfa_verified(&self, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE super_admin_sessions SET mfa_verified = TRUE WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn touch_super_admin_session(
        &self,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE super_admin_sessions SET last_activity_utc = $1 WHERE session_id = $2")
            .bind(at)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Impersonation ====================

    async fn replace_impersonation_session(
        &self,
        session: &ImpersonationSession,
    ) -> Result<u64, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let ended = sqlx::query(
            r#"
            UPDATE impersonation_sessions
            SET ended_utc = NOW(), end_reason = 'new_session_started'
            WHERE super_admin_id = $1 AND ended_utc IS NULL
            "#,
        )
        .bind(session.super_admin_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO impersonation_sessions (impersonation_id, super_admin_id,
                                                super_admin_session_id, target_user_id,
                                                target_tenant_id, reason, expiry_utc,
                                                ended_utc, end_reason, ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.impersonation_id)
        .bind(session.super_admin_id)
        .bind(session.super_admin_session_id)
        .bind(session.target_user_id)
        .bind(session.target_tenant_id)
        .bind(&session.reason)
        .bind(session.expiry_utc)
        .bind(session.ended_utc)
        .bind(&session.end_reason)
        .bind(&session.ip)
        .bind(session.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(ended.rows_affected())
    }

    async fn find_impersonation_session(
        &self,
        impersonation_id: Uuid,
    ) -> Result<Option<ImpersonationSession>, AppError> {
        sqlx::query_as::<_, ImpersonationSession>(
            "SELECT * FROM impersonation_sessions WHERE impersonation_id = $1",
        )
        .bind(impersonation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn end_impersonation_session(
        &self,
        impersonation_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE impersonation_sessions SET ended_utc = $1, end_reason = $2
            WHERE impersonation_id = $3 AND ended_utc IS NULL
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(impersonation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn end_expired_impersonation_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE impersonation_sessions SET ended_utc = $1, end_reason = 'expired'
            WHERE ended_utc IS NULL AND expiry_utc <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    // ==================== Audit Log ====================

    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (audit_id, actor_user_id, action, resource_type, resource_id,
                                   tenant_id, before_value, after_value, ip, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.audit_id)
        .bind(entry.actor_user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.tenant_id)
        .bind(&entry.before_value)
        .bind(&entry.after_value)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn list_audit_entries(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        match tenant_id {
            Some(tenant_id) => sqlx::query_as::<_, AuditLogEntry>(
                "SELECT * FROM audit_log WHERE tenant_id = $1 ORDER BY created_utc DESC LIMIT $2",
            )
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e))),
            None => sqlx::query_as::<_, AuditLogEntry>(
                "SELECT * FROM audit_log ORDER BY created_utc DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e))),
        }
    }

    // ==================== Rate Limiting & IP Allowlist ====================

    async fn find_rate_limit_window(
        &self,
        user_id: Uuid,
        bucket: &str,
    ) -> Result<Option<RateLimitWindow>, AppError> {
        sqlx::query_as::<_, RateLimitWindow>(
            "SELECT * FROM rate_limit_windows WHERE user_id = $1 AND bucket = $2",
        )
        .bind(user_id)
        .bind(bucket)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn put_rate_limit_window(&self, window: &RateLimitWindow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_windows (user_id, bucket, window_start_utc, count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, bucket)
            DO UPDATE SET window_start_utc = EXCLUDED.window_start_utc, count = EXCLUDED.count
            "#,
        )
        .bind(window.user_id)
        .bind(&window.bucket)
        .bind(window.window_start_utc)
        .bind(window.count)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn list_ip_allowlist(&self) -> Result<Vec<IpAllowlistEntry>, AppError> {
        sqlx::query_as::<_, IpAllowlistEntry>("SELECT * FROM ip_allowlist ORDER BY created_utc")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_ip_allowlist_entry(&self, entry: &IpAllowlistEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ip_allowlist (entry_id, ip, note, created_by, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.entry_id)
        .bind(&entry.ip)
        .bind(&entry.note)
        .bind(entry.created_by)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Magic Links ====================

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO magic_links (magic_link_id, email, token_hash, purpose_code, expiry_utc,
                                     consumed_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(link.magic_link_id)
        .bind(&link.email)
        .bind(&link.token_hash)
        .bind(&link.purpose_code)
        .bind(link.expiry_utc)
        .bind(link.consumed_utc)
        .bind(link.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_magic_link(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<MagicLink>, AppError> {
        sqlx::query_as::<_, MagicLink>(
            "SELECT * FROM magic_links WHERE LOWER(email) = LOWER($1) AND token_hash = $2",
        )
        .bind(email)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn consume_magic_link(
        &self,
        magic_link_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE magic_links SET consumed_utc = $1
            WHERE magic_link_id = $2 AND consumed_utc IS NULL
            "#,
        )
        .bind(at)
        .bind(magic_link_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Invitations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (invitation_id, organization_id, email, role_code, token_hash,
                                     state_code, expiry_utc, accepted_utc, invited_by_user_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(invitation.organization_id)
        .bind(&invitation.email)
        .bind(&invitation.role_code)
        .bind(&invitation.token_hash)
        .bind(&invitation.state_code)
        .bind(invitation.expiry_utc)
        .bind(invitation.accepted_utc)
        .bind(invitation.invited_by_user_id)
        .bind(invitation.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE invitation_id = $1")
            .bind(invitation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_pending_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT * FROM invitations
            WHERE organization_id = $1 AND LOWER(email) = LOWER($2) AND state_code = 'pending'
            "#,
        )
        .bind(organization_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn rotate_invitation_token(
        &self,
        invitation_id: Uuid,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE invitations SET token_hash = $1, expiry_utc = $2 WHERE invitation_id = $3",
        )
        .bind(token_hash)
        .bind(expiry)
        .bind(invitation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn mark_invitation_accepted(
        &self,
        invitation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invitations SET state_code = 'accepted', accepted_utc = $1
            WHERE invitation_id = $2
            "#,
        )
        .bind(at)
        .bind(invitation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Custom Roles ====================

    async fn find_custom_role(&self, role_id: Uuid) -> Result<Option<CustomRole>, AppError> {
        sqlx::query_as::<_, CustomRole>("SELECT * FROM custom_roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_custom_role(&self, role: &CustomRole) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO custom_roles (role_id, organization_id, role_label, parent_role_code,
                                      permissions, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.role_id)
        .bind(role.organization_id)
        .bind(&role.role_label)
        .bind(&role.parent_role_code)
        .bind(&role.permissions)
        .bind(role.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}
