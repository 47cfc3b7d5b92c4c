//! Impersonation manager - a super admin temporarily acting as a tenant
//! user. Strictly time-boxed, fully audited, and always carrying the
//! real actor's identity alongside the target's.

use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{IdentityError, ImpersonationErrorCode};
use super::token::{IdentityClaims, ImpersonatorClaims, TokenService};
use crate::models::{AuditLogEntry, ImpersonationSession, RequestMeta, TenantSummary};
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct ImpersonationService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
}

impl ImpersonationService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Start impersonating a tenant user.
    ///
    /// The issued token carries the target's identity plus an
    /// `impersonator` block naming the real actor, so downstream
    /// authorization acts as the target while the audit trail can
    /// always attribute the operator.
    pub async fn start_impersonation(
        &self,
        super_admin_id: Uuid,
        super_admin_session_id: Uuid,
        target_user_id: Uuid,
        target_tenant_id: Uuid,
        reason: &str,
        meta: &RequestMeta,
    ) -> Result<(ImpersonationSession, String), IdentityError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(IdentityError::Impersonation(
                ImpersonationErrorCode::ReasonRequired,
            ));
        }

        let actor = self
            .store
            .find_super_admin(super_admin_id)
            .await?
            .filter(|a| a.is_active && a.can_impersonate)
            .ok_or(IdentityError::Impersonation(
                ImpersonationErrorCode::NotSuperAdmin,
            ))?;

        let Some(target) = self.store.find_user_by_id(target_user_id).await? else {
            return Err(IdentityError::Impersonation(
                ImpersonationErrorCode::TargetNotFound,
            ));
        };

        if self
            .store
            .find_super_admin(target_user_id)
            .await?
            .map(|a| a.is_active)
            .unwrap_or(false)
        {
            return Err(IdentityError::Impersonation(
                ImpersonationErrorCode::CannotImpersonateSuperAdmin,
            ));
        }

        let membership = self
            .store
            .find_membership(target_user_id, target_tenant_id)
            .await?;
        let organization = self.store.find_org_by_id(target_tenant_id).await?;
        let (membership, organization) = match (membership, organization) {
            (Some(m), Some(o)) if o.is_active() => (m, o),
            _ => {
                return Err(IdentityError::Impersonation(
                    ImpersonationErrorCode::NoTenantAccess,
                ))
            }
        };

        // Prior active impersonations end inside the same transaction
        // that records the new session.
        let session = ImpersonationSession::new(
            super_admin_id,
            super_admin_session_id,
            target_user_id,
            target_tenant_id,
            reason.to_string(),
            meta,
        );
        let superseded = self.store.replace_impersonation_session(&session).await?;
        if superseded > 0 {
            tracing::warn!(super_admin_id = %super_admin_id, superseded, "Prior impersonation sessions ended");
        }

        let tenants: Vec<TenantSummary> = self
            .store
            .list_user_tenants(target_user_id)
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

        let actor_user = self.store.find_user_by_id(actor.user_id).await?.ok_or(
            IdentityError::Impersonation(ImpersonationErrorCode::NotSuperAdmin),
        )?;
        let token = self.tokens.issue_impersonation(
            &target,
            session.impersonation_id,
            Some(&active),
            &tenants,
            ImpersonatorClaims {
                user_id: actor_user.user_id,
                email: actor_user.email.clone(),
                session_id: super_admin_session_id,
            },
        )?;

        self.store
            .append_audit_entry(
                &AuditLogEntry::new("impersonation.start", Some(super_admin_id))
                    .with_resource("impersonation_session", session.impersonation_id.to_string())
                    .with_tenant(target_tenant_id)
                    .with_snapshots(
                        None,
                        Some(json!({
                            "reason": reason,
                            "target_email": target.email,
                            "expiry_utc": session.expiry_utc,
                        })),
                    )
                    .with_request_meta(meta),
            )
            .await?;

        tracing::info!(
            super_admin_id = %super_admin_id,
            target_user_id = %target_user_id,
            target_tenant_id = %target_tenant_id,
            impersonation_id = %session.impersonation_id,
            "Impersonation started"
        );
        Ok((session, token))
    }

    /// End an impersonation session. Idempotent; logs an audit entry
    /// when the acting super admin is known.
    pub async fn end_impersonation(
        &self,
        impersonation_id: Uuid,
        reason: &str,
        super_admin_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let ended = self
            .store
            .end_impersonation_session(impersonation_id, reason, Utc::now())
            .await?;

        if ended {
            if let Some(actor) = super_admin_id {
                self.store
                    .append_audit_entry(
                        &AuditLogEntry::new("impersonation.end", Some(actor))
                            .with_resource(
                                "impersonation_session",
                                impersonation_id.to_string(),
                            )
                            .with_snapshots(None, Some(json!({ "end_reason": reason }))),
                    )
                    .await?;
            }
            tracing::info!(impersonation_id = %impersonation_id, reason, "Impersonation ended");
        }
        Ok(())
    }

    /// Validate an impersonation session: not ended and not expired.
    pub async fn validate_impersonation_session(
        &self,
        impersonation_id: Uuid,
    ) -> Result<Option<ImpersonationSession>, AppError> {
        let session = self.store.find_impersonation_session(impersonation_id).await?;
        Ok(session.filter(|s| s.is_active()))
    }

    /// Structural check for impersonation tokens.
    pub fn is_impersonation_token(&self, claims: &IdentityClaims) -> bool {
        claims.is_impersonation()
    }

    /// Batch-mark lapsed sessions as expired. Driven by an external
    /// scheduler; idempotent and safe alongside live traffic.
    pub async fn cleanup_expired_impersonation_sessions(&self) -> Result<u64, AppError> {
        let ended = self
            .store
            .end_expired_impersonation_sessions(Utc::now())
            .await?;
        if ended > 0 {
            tracing::info!(ended, "Expired impersonation sessions cleaned up");
        }
        Ok(ended)
    }

}
