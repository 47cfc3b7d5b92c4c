//! Super admin models - the elevated access layer, governed by a
//! separate session lifecycle from ordinary users.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::RequestMeta;

/// Super admin registry entry, 1:1 with a user.
#[derive(Debug, Clone, FromRow)]
pub struct SuperAdminUser {
    pub user_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub can_access_all_tenants: bool,
    pub can_impersonate: bool,
    pub can_manage_super_admins: bool,
    pub mfa_enabled: bool,
    pub is_active: bool,
    pub last_access_ip: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl SuperAdminUser {
    /// Grant super admin status to a user.
    pub fn new(user_id: Uuid, granted_by: Option<Uuid>) -> Self {
        Self {
            user_id,
            granted_by,
            can_access_all_tenants: true,
            can_impersonate: false,
            can_manage_super_admins: false,
            mfa_enabled: true,
            is_active: true,
            last_access_ip: None,
            created_utc: Utc::now(),
        }
    }
}

/// Revocation reasons recorded on super admin sessions.
pub mod revoke_reason {
    pub const SUPERSEDED: &str = "new_session_started";
    pub const INACTIVITY: &str = "inactivity_timeout";
    pub const MANUAL: &str = "manual";
    pub const ADMIN_DISABLED: &str = "admin_disabled";
}

/// Elevated session. Hard 4-hour absolute expiry plus a sliding
/// inactivity window; at most one active session per super admin.
#[derive(Debug, Clone, FromRow)]
pub struct SuperAdminSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub inactivity_timeout_minutes: i32,
    pub last_activity_utc: DateTime<Utc>,
    pub mfa_verified: bool,
    pub mfa_challenge_expiry_utc: Option<DateTime<Utc>>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl SuperAdminSession {
    /// Create a new elevated session.
    pub fn new(
        user_id: Uuid,
        token_hash: String,
        lifetime_hours: i64,
        inactivity_timeout_minutes: i32,
        meta: &RequestMeta,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token_hash,
            expiry_utc: now + Duration::hours(lifetime_hours),
            inactivity_timeout_minutes,
            last_activity_utc: now,
            mfa_verified: false,
            mfa_challenge_expiry_utc: None,
            revoked_utc: None,
            revoked_reason: None,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    /// Check the sliding inactivity window.
    pub fn is_inactive(&self, now: DateTime<Utc>) -> bool {
        self.last_activity_utc + Duration::minutes(self.inactivity_timeout_minutes as i64) < now
    }

    /// Check the MFA challenge window is still open.
    pub fn mfa_challenge_open(&self, now: DateTime<Utc>) -> bool {
        self.mfa_challenge_expiry_utc
            .map(|expiry| expiry > now)
            .unwrap_or(false)
    }
}

/// Super admin info for API responses.
#[derive(Debug, Serialize)]
pub struct SuperAdminResponse {
    pub user_id: Uuid,
    pub can_access_all_tenants: bool,
    pub can_impersonate: bool,
    pub can_manage_super_admins: bool,
    pub mfa_enabled: bool,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<SuperAdminUser> for SuperAdminResponse {
    fn from(a: SuperAdminUser) -> Self {
        Self {
            user_id: a.user_id,
            can_access_all_tenants: a.can_access_all_tenants,
            can_impersonate: a.can_impersonate,
            can_manage_super_admins: a.can_manage_super_admins,
            mfa_enabled: a.mfa_enabled,
            is_active: a.is_active,
            created_utc: a.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SuperAdminSession {
        SuperAdminSession::new(
            Uuid::new_v4(),
            "hash".to_string(),
            4,
            30,
            &RequestMeta::default(),
        )
    }

    #[test]
    fn test_new_session_not_inactive() {
        let s = session();
        assert!(!s.is_inactive(Utc::now()));
        assert!(!s.is_expired());
        assert!(!s.mfa_verified);
    }

    #[test]
    fn test_inactivity_window() {
        let s = session();
        let later = Utc::now() + Duration::minutes(31);
        assert!(s.is_inactive(later));
    }

    #[test]
    fn test_mfa_challenge_window() {
        let mut s = session();
        assert!(!s.mfa_challenge_open(Utc::now()));
        s.mfa_challenge_expiry_utc = Some(Utc::now() + Duration::minutes(5));
        assert!(s.mfa_challenge_open(Utc::now()));
        assert!(!s.mfa_challenge_open(Utc::now() + Duration::minutes(6)));
    }
}
