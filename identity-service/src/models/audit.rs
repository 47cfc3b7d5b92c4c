//! Audit log model - immutable append-only trail for elevated actions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::RequestMeta;

/// Append-only audit entry. Never updated or deleted by this service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLogEntry {
    pub audit_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub before_value: Option<serde_json::Value>,
    pub after_value: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create a new audit entry for an action by the given actor.
    pub fn new(action: impl Into<String>, actor_user_id: Option<Uuid>) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            actor_user_id,
            action: action.into(),
            resource_type: None,
            resource_id: None,
            tenant_id: None,
            before_value: None,
            after_value: None,
            ip: None,
            user_agent: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_snapshots(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before_value = before;
        self.after_value = after;
        self
    }

    pub fn with_request_meta(mut self, meta: &RequestMeta) -> Self {
        self.ip = meta.ip.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }
}
