//! Impersonation session model - a super admin temporarily acting as a
//! tenant user, strictly time-boxed.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::RequestMeta;

/// Hard cap on impersonation session lifetime. There is no code path
/// that extends a session past this.
pub const IMPERSONATION_DURATION_MINUTES: i64 = 60;

/// End reasons recorded on impersonation sessions.
pub mod end_reason {
    pub const MANUAL: &str = "manual";
    pub const EXPIRED: &str = "expired";
    pub const SUPERSEDED: &str = "new_session_started";
}

/// Impersonation session entity.
#[derive(Debug, Clone, FromRow)]
pub struct ImpersonationSession {
    pub impersonation_id: Uuid,
    pub super_admin_id: Uuid,
    pub super_admin_session_id: Uuid,
    pub target_user_id: Uuid,
    pub target_tenant_id: Uuid,
    pub reason: String,
    pub expiry_utc: DateTime<Utc>,
    pub ended_utc: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    pub ip: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl ImpersonationSession {
    /// Create a new impersonation session with the fixed 1-hour expiry.
    pub fn new(
        super_admin_id: Uuid,
        super_admin_session_id: Uuid,
        target_user_id: Uuid,
        target_tenant_id: Uuid,
        reason: String,
        meta: &RequestMeta,
    ) -> Self {
        let now = Utc::now();
        Self {
            impersonation_id: Uuid::new_v4(),
            super_admin_id,
            super_admin_session_id,
            target_user_id,
            target_tenant_id,
            reason,
            expiry_utc: now + Duration::minutes(IMPERSONATION_DURATION_MINUTES),
            ended_utc: None,
            end_reason: None,
            ip: meta.ip.clone(),
            created_utc: now,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    /// Check if the session is still usable.
    pub fn is_active(&self) -> bool {
        !self.is_ended() && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_exactly_one_hour() {
        let s = ImpersonationSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "debug a payout issue".to_string(),
            &RequestMeta::default(),
        );
        assert_eq!(
            s.expiry_utc - s.created_utc,
            Duration::minutes(IMPERSONATION_DURATION_MINUTES)
        );
        assert!(s.is_active());
    }

    #[test]
    fn test_ended_session_is_not_active() {
        let mut s = ImpersonationSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "support ticket 4211".to_string(),
            &RequestMeta::default(),
        );
        s.ended_utc = Some(Utc::now());
        s.end_reason = Some(end_reason::MANUAL.to_string());
        assert!(!s.is_active());
    }
}
