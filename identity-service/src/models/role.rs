//! Custom role model - tenant-scoped roles with explicit permission sets.
//!
//! Predefined roles are fixed read-only sets defined in the RBAC service;
//! only custom roles live in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Custom role entity (tenant-scoped, mutable).
///
/// `parent_role_code` may name a predefined role code or the id of
/// another custom role in the same tenant; permissions inherit through
/// the chain.
#[derive(Debug, Clone, FromRow)]
pub struct CustomRole {
    pub role_id: Uuid,
    pub organization_id: Uuid,
    pub role_label: String,
    pub parent_role_code: Option<String>,
    pub permissions: Json<Vec<String>>,
    pub created_utc: DateTime<Utc>,
}

impl CustomRole {
    /// Create a new custom role.
    pub fn new(
        organization_id: Uuid,
        role_label: String,
        parent_role_code: Option<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            organization_id,
            role_label,
            parent_role_code,
            permissions: Json(permissions),
            created_utc: Utc::now(),
        }
    }
}

/// Request to create a custom role.
#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub organization_id: Uuid,
    pub role_label: String,
    pub parent_role_code: Option<String>,
    pub permissions: Vec<String>,
}

/// Role response for API.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role_id: Uuid,
    pub organization_id: Uuid,
    pub role_label: String,
    pub parent_role_code: Option<String>,
    pub permissions: Vec<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<CustomRole> for RoleResponse {
    fn from(r: CustomRole) -> Self {
        Self {
            role_id: r.role_id,
            organization_id: r.organization_id,
            role_label: r.role_label,
            parent_role_code: r.parent_role_code,
            permissions: r.permissions.0,
            created_utc: r.created_utc,
        }
    }
}
