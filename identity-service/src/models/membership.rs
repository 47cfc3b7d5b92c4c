//! Membership model - the association granting a user a role within one tenant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::Organization;

/// Membership entity. (user_id, organization_id) is unique; at most one
/// membership per user carries is_default = true.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role_code: String,
    pub is_default: bool,
    pub last_active_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    /// Create a new membership.
    pub fn new(user_id: Uuid, organization_id: Uuid, role_code: String) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            user_id,
            organization_id,
            role_code,
            is_default: false,
            last_active_utc: None,
            created_utc: Utc::now(),
        }
    }
}

/// Membership joined with its organization, as returned by the store.
#[derive(Debug, Clone)]
pub struct UserTenant {
    pub membership: Membership,
    pub organization: Organization,
}

impl UserTenant {
    /// Check that both the membership's organization is active and
    /// usable as a tenant context.
    pub fn is_accessible(&self) -> bool {
        self.organization.is_active()
    }
}

/// Tenant summary for API responses and token claims.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub organization_id: Uuid,
    pub org_slug: String,
    pub org_label: String,
    pub role_code: String,
    pub is_default: bool,
}

impl From<&UserTenant> for TenantSummary {
    fn from(t: &UserTenant) -> Self {
        Self {
            organization_id: t.organization.organization_id,
            org_slug: t.organization.org_slug.clone(),
            org_label: t.organization.org_label.clone(),
            role_code: t.membership.role_code.clone(),
            is_default: t.membership.is_default,
        }
    }
}
