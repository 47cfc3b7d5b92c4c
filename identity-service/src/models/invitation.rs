//! Invitation model - emailed invitations bound to email + role + tenant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invitation state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    Pending,
    Accepted,
    Revoked,
}

impl InvitationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationState::Pending => "pending",
            InvitationState::Accepted => "accepted",
            InvitationState::Revoked => "revoked",
        }
    }
}

/// Invitation entity.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role_code: String,
    pub token_hash: String,
    pub state_code: String,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub invited_by_user_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl Invitation {
    /// Create a new pending invitation.
    pub fn new(
        organization_id: Uuid,
        email: String,
        role_code: String,
        token_hash: String,
        lifetime_days: i64,
        invited_by_user_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: Uuid::new_v4(),
            organization_id,
            email: crate::utils::normalize_email(&email),
            role_code,
            token_hash,
            state_code: InvitationState::Pending.as_str().to_string(),
            expiry_utc: now + Duration::days(lifetime_days),
            accepted_utc: None,
            invited_by_user_id,
            created_utc: now,
        }
    }

    /// Check if invitation is pending and not expired.
    pub fn is_valid(&self) -> bool {
        self.state_code == InvitationState::Pending.as_str() && Utc::now() < self.expiry_utc
    }

    /// Check if invitation has been accepted.
    pub fn is_accepted(&self) -> bool {
        self.state_code == InvitationState::Accepted.as_str()
    }

    /// Check if invitation has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiry_utc
    }
}

/// Invitation response for API.
#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role_code: String,
    pub state_code: String,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            invitation_id: i.invitation_id,
            organization_id: i.organization_id,
            email: i.email,
            role_code: i.role_code,
            state_code: i.state_code,
            expiry_utc: i.expiry_utc,
            created_utc: i.created_utc,
        }
    }
}
