//! Tenant context switcher - moving a multi-org user between their
//! accessible organizations.

use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use super::error::IdentityError;
use super::token::TokenService;
use crate::models::{AuditLogEntry, TenantSummary, UserTenant};
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct TenantContextService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
}

impl TenantContextService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Switch the user's active tenant context.
    ///
    /// Validates membership and that the target organization is active,
    /// re-issues a token scoped to the new org with the full accessible
    /// org list recomputed, moves the session's org pointer, and bumps
    /// the membership's last-active timestamp.
    pub async fn switch_tenant_context(
        &self,
        user_id: Uuid,
        target_tenant_slug: &str,
        session_id: Uuid,
        ip: Option<String>,
    ) -> Result<(String, TenantSummary), IdentityError> {
        let Some(organization) = self.store.find_org_by_slug(target_tenant_slug).await? else {
            return Err(IdentityError::TenantAccess(format!(
                "Unknown organization: {}",
                target_tenant_slug
            )));
        };
        if !organization.is_active() {
            return Err(IdentityError::TenantAccess(
                "Organization is suspended".to_string(),
            ));
        }

        let Some(membership) = self
            .store
            .find_membership(user_id, organization.organization_id)
            .await?
        else {
            return Err(IdentityError::TenantAccess(
                "No membership in target organization".to_string(),
            ));
        };

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| IdentityError::Authentication("User is not active".to_string()))?;

        let tenants: Vec<TenantSummary> = self
            .store
            .list_user_tenants(user_id)
            .await?
            .iter()
            .filter(|t| t.is_accessible())
            .map(TenantSummary::from)
            .collect();
        let active = TenantSummary {
            organization_id: organization.organization_id,
            org_slug: organization.org_slug.clone(),
            org_label: organization.org_label.clone(),
            role_code: membership.role_code.clone(),
            is_default: membership.is_default,
        };

        let token = self.tokens.issue(&user, session_id, Some(&active), &tenants)?;

        let now = Utc::now();
        self.store
            .update_session_org(session_id, organization.organization_id)
            .await?;
        self.store
            .update_membership_last_active(user_id, organization.organization_id, now)
            .await?;

        self.store
            .append_audit_entry(
                &AuditLogEntry::new("tenant.switched", Some(user_id))
                    .with_tenant(organization.organization_id)
                    .with_snapshots(None, Some(json!({ "org_slug": organization.org_slug })))
                    .with_request_meta(&crate::models::RequestMeta {
                        ip,
                        user_agent: None,
                    }),
            )
            .await?;

        tracing::info!(user_id = %user_id, org = %organization.org_slug, "Tenant context switched");
        Ok((token, active))
    }

    /// All of the user's memberships joined with their organizations.
    pub async fn get_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, AppError> {
        self.store.list_user_tenants(user_id).await
    }

    /// The user's default tenant, if one is set.
    pub async fn get_default_tenant(&self, user_id: Uuid) -> Result<Option<UserTenant>, AppError> {
        Ok(self
            .store
            .list_user_tenants(user_id)
            .await?
            .into_iter()
            .find(|t| t.membership.is_default))
    }

    /// Set the default tenant, clearing any prior default first. The
    /// store applies both writes atomically.
    pub async fn set_default_tenant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(), IdentityError> {
        if self
            .store
            .find_membership(user_id, organization_id)
            .await?
            .is_none()
        {
            return Err(IdentityError::TenantAccess(
                "No membership in target organization".to_string(),
            ));
        }
        self.store.set_default_tenant(user_id, organization_id).await?;
        Ok(())
    }

    /// True iff the user belongs to more than one active organization
    /// and has not picked a default yet.
    pub async fn should_show_welcome_modal(&self, user_id: Uuid) -> Result<bool, AppError> {
        let tenants = self.store.list_user_tenants(user_id).await?;
        let active = tenants.iter().filter(|t| t.is_accessible()).count();
        let has_default = tenants.iter().any(|t| t.membership.is_default);
        Ok(active > 1 && !has_default)
    }
}
