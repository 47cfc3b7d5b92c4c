//! Tenant context handlers: listing, switching, default selection.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::auth::session_cookie;
use crate::middleware::{AuthUser, Meta};
use crate::models::TenantSummary;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SwitchTenantRequest {
    pub org_slug: String,
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultTenantRequest {
    pub organization_id: Uuid,
}

/// List the caller's accessible organizations.
pub async fn list_tenants(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let tenants = state.tenants.get_user_tenants(ctx.user_id).await?;
    let summaries: Vec<TenantSummary> = tenants
        .iter()
        .filter(|t| t.is_accessible())
        .map(TenantSummary::from)
        .collect();
    let default = state.tenants.get_default_tenant(ctx.user_id).await?;
    let welcome = state
        .tenants
        .should_show_welcome_modal(ctx.user_id)
        .await?;

    Ok(Json(json!({
        "organizations": summaries,
        "default_organization_id": default.map(|t| t.organization.organization_id),
        "should_show_welcome_modal": welcome,
    })))
}

/// Switch the active tenant context; re-issues the bearer token.
pub async fn switch_tenant(
    State(state): State<AppState>,
    jar: CookieJar,
    Meta(meta): Meta,
    AuthUser(ctx): AuthUser,
    Json(req): Json<SwitchTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = ctx
        .session_id
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("No backing session")))?;

    let (token, tenant) = state
        .tenants
        .switch_tenant_context(ctx.user_id, &req.org_slug, session_id, meta.ip)
        .await?;

    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((
        StatusCode::OK,
        jar,
        Json(json!({ "token": token, "active_organization": tenant })),
    ))
}

/// Pick the default organization (clears any previous default).
pub async fn set_default_tenant(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(req): Json<SetDefaultTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .tenants
        .set_default_tenant(ctx.user_id, req.organization_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "default_organization_id": req.organization_id })),
    ))
}
