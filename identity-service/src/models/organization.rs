//! Organization model - tenant records, owned externally and read here
//! for membership and context checks only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Organization state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgState {
    Active,
    Suspended,
}

impl OrgState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgState::Active => "active",
            OrgState::Suspended => "suspended",
        }
    }
}

/// Organization (tenant) entity.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub organization_id: Uuid,
    pub org_slug: String,
    pub org_label: String,
    pub org_state_code: String,
    pub created_utc: DateTime<Utc>,
}

impl Organization {
    /// Create a new active organization.
    pub fn new(org_slug: String, org_label: String) -> Self {
        Self {
            organization_id: Uuid::new_v4(),
            org_slug,
            org_label,
            org_state_code: OrgState::Active.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    /// Check if organization is active.
    pub fn is_active(&self) -> bool {
        self.org_state_code == OrgState::Active.as_str()
    }
}
