//! Super admin handlers: elevated login, MFA, impersonation, registry
//! maintenance, and the audit feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::{Meta, SuperAdmin};
use crate::models::super_admin::{revoke_reason, SuperAdminResponse};
use crate::models::{impersonation::end_reason, AuditLogEntry};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Rate limit buckets for elevated flows.
mod buckets {
    pub const ADMIN_LOGIN: &str = "admin_login";
    pub const IMPERSONATION: &str = "impersonation";
}

/// Impersonation starts allowed per super admin per hour.
const IMPERSONATION_LIMIT: i64 = 20;
const IMPERSONATION_WINDOW_SECONDS: i64 = 3600;

#[derive(Debug, Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MfaVerifyRequest {
    #[validate(length(min = 6))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct StartImpersonationRequest {
    pub target_user_id: Uuid,
    pub target_tenant_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct EndImpersonationRequest {
    pub impersonation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GrantSuperAdminRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub can_impersonate: bool,
    #[serde(default)]
    pub can_manage_super_admins: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddIpAllowlistRequest {
    pub ip: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub tenant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Elevated login with email and password.
///
/// This route sits outside the super admin middleware, so it applies
/// the IP allowlist and the per-user fixed-window rate limit itself.
pub async fn admin_login(
    State(state): State<AppState>,
    Meta(meta): Meta,
    ValidatedJson(req): ValidatedJson<AdminLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(ip) = &meta.ip {
        if !state.super_admins.check_ip_allowlist(ip).await? {
            tracing::warn!(ip = %ip, "Admin login from non-allowlisted IP");
            return Err(AppError::Forbidden(anyhow::anyhow!("IP not allowed")));
        }
    }

    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .filter(|u| u.is_active())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid credentials")))?;

    let allowed = state
        .super_admins
        .check_rate_limit(
            user.user_id,
            buckets::ADMIN_LOGIN,
            state.config.rate_limit.admin_login_attempts as i64,
            state.config.rate_limit.admin_login_window_seconds as i64,
        )
        .await?;
    if !allowed {
        return Err(AppError::TooManyRequests(
            "Too many login attempts. Please try again later.".to_string(),
            Some(state.config.rate_limit.admin_login_window_seconds),
        ));
    }

    if !state.credentials.verify_password(&user, &req.password) {
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials")));
    }

    let (session, raw_token) = state
        .super_admins
        .create_session(user.user_id, &meta)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "token": raw_token,
            "session_id": session.session_id,
            "expiry_utc": session.expiry_utc,
            "mfa_required": !session.mfa_verified,
            "mfa_challenge_expiry_utc": session.mfa_challenge_expiry_utc,
        })),
    ))
}

/// Confirm the MFA challenge accepted by the upstream MFA provider.
pub async fn verify_mfa(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    ValidatedJson(_req): ValidatedJson<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .super_admins
        .mark_mfa_verified(ctx.session.session_id)
        .await?;

    state
        .super_admins
        .log_audit_action(
            AuditLogEntry::new("super_admin.mfa_verified", Some(ctx.admin.user_id))
                .with_resource("super_admin_session", ctx.session.session_id.to_string())
                .with_request_meta(&meta),
        )
        .await?;

    Ok((StatusCode::OK, Json(json!({ "mfa_verified": true }))))
}

/// Revoke the current elevated session.
pub async fn admin_logout(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
) -> Result<impl IntoResponse, AppError> {
    state
        .super_admins
        .revoke_session(ctx.session.session_id, revoke_reason::MANUAL)
        .await?;
    Ok((StatusCode::OK, Json(json!({ "message": "Logged out" }))))
}

/// Start impersonating a tenant user.
pub async fn start_impersonation(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    Json(req): Json<StartImpersonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.features.impersonation {
        return Err(crate::services::IdentityError::FeatureNotEnabled(
            "impersonation".to_string(),
        )
        .into());
    }
    ctx.require_mfa_verified()?;

    let allowed = state
        .super_admins
        .check_rate_limit(
            ctx.admin.user_id,
            buckets::IMPERSONATION,
            IMPERSONATION_LIMIT,
            IMPERSONATION_WINDOW_SECONDS,
        )
        .await?;
    if !allowed {
        return Err(AppError::TooManyRequests(
            "Impersonation rate limit exceeded".to_string(),
            None,
        ));
    }

    let (session, token) = state
        .impersonations
        .start_impersonation(
            ctx.admin.user_id,
            ctx.session.session_id,
            req.target_user_id,
            req.target_tenant_id,
            &req.reason,
            &meta,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "impersonation_id": session.impersonation_id,
            "token": token,
            "target_user_id": session.target_user_id,
            "target_tenant_id": session.target_tenant_id,
            "expiry_utc": session.expiry_utc,
        })),
    ))
}

/// End an impersonation session (idempotent).
pub async fn end_impersonation(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Json(req): Json<EndImpersonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .impersonations
        .end_impersonation(
            req.impersonation_id,
            end_reason::MANUAL,
            Some(ctx.admin.user_id),
        )
        .await?;
    Ok((StatusCode::OK, Json(json!({ "ended": true }))))
}

/// Grant super admin status.
pub async fn grant_super_admin(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    Json(req): Json<GrantSuperAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_mfa_verified()?;

    let admin = state
        .super_admins
        .grant_super_admin(
            ctx.admin.user_id,
            req.user_id,
            req.can_impersonate,
            req.can_manage_super_admins,
            &meta,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SuperAdminResponse::from(admin))))
}

/// Revoke super admin status. Refuses self-revocation and dropping the
/// active count to zero.
pub async fn revoke_super_admin(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_mfa_verified()?;

    state
        .super_admins
        .revoke_super_admin(ctx.admin.user_id, user_id, &meta)
        .await?;
    Ok((StatusCode::OK, Json(json!({ "revoked": true }))))
}

/// Disable a user account platform-wide.
pub async fn disable_user(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_mfa_verified()?;

    state
        .super_admins
        .disable_user(ctx.admin.user_id, user_id, &meta)
        .await?;
    Ok((StatusCode::OK, Json(json!({ "disabled": true }))))
}

/// Add an IP allowlist entry (audited settings change).
pub async fn add_ip_allowlist_entry(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Meta(meta): Meta,
    Json(req): Json<AddIpAllowlistRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_mfa_verified()?;

    let entry = state
        .super_admins
        .add_ip_allowlist_entry(ctx.admin.user_id, req.ip, req.note, &meta)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "entry_id": entry.entry_id, "ip": entry.ip })),
    ))
}

/// Read the audit trail.
pub async fn list_audit_entries(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let entries = state
        .super_admins
        .list_audit_entries(query.tenant_id, limit)
        .await?;
    Ok(Json(json!({ "entries": entries })))
}

/// Sweep expired sessions and impersonations. Intended to be hit by an
/// external scheduler; idempotent.
pub async fn run_maintenance_sweep(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
) -> Result<impl IntoResponse, AppError> {
    let sessions_deleted = state.sessions.sweep_expired_sessions().await?;
    let impersonations_ended = state
        .impersonations
        .cleanup_expired_impersonation_sessions()
        .await?;

    Ok(Json(json!({
        "sessions_deleted": sessions_deleted,
        "impersonations_ended": impersonations_ended,
    })))
}
