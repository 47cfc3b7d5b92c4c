//! Session model - ordinary user sessions backed by opaque tokens.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Request metadata captured at session creation.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Session entity. Only the token hash is stored, never the raw token.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Session {
    /// Create a new session.
    pub fn new(
        user_id: Uuid,
        organization_id: Option<Uuid>,
        token_hash: String,
        lifetime_days: i64,
        meta: &RequestMeta,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            organization_id,
            token_hash,
            expiry_utc: Utc::now() + Duration::days(lifetime_days),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            revoked_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Check if session is valid (not expired, not revoked).
    pub fn is_valid(&self) -> bool {
        self.revoked_utc.is_none() && self.expiry_utc > Utc::now()
    }

    /// Check if session is expired.
    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    /// Check if session is revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_valid() {
        let s = Session::new(
            Uuid::new_v4(),
            None,
            "hash".to_string(),
            30,
            &RequestMeta::default(),
        );
        assert!(s.is_valid());
        assert!(!s.is_expired());
        assert!(!s.is_revoked());
    }

    #[test]
    fn test_revoked_session_is_invalid() {
        let mut s = Session::new(
            Uuid::new_v4(),
            None,
            "hash".to_string(),
            30,
            &RequestMeta::default(),
        );
        s.revoked_utc = Some(Utc::now());
        assert!(!s.is_valid());
    }

    #[test]
    fn test_expired_session_is_invalid() {
        let mut s = Session::new(
            Uuid::new_v4(),
            None,
            "hash".to_string(),
            30,
            &RequestMeta::default(),
        );
        s.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(!s.is_valid());
    }
}
