//! Custom role handlers.
//!
//! Predefined roles are immutable; these endpoints manage the
//! tenant-scoped custom roles that inherit from them.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::role::{CreateRoleRequest, RoleResponse};
use crate::models::CustomRole;
use crate::services::rbac;
use crate::AppState;

/// Permission gating custom role management.
const MANAGE_ROLES_PERMISSION: &str = "settings.roles.manage";

/// Create a tenant-scoped custom role.
pub async fn create_custom_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_manage_permission(&state, &ctx, req.organization_id).await?;

    let role = CustomRole::new(
        req.organization_id,
        req.role_label,
        req.parent_role_code,
        req.permissions,
    );
    state.store.insert_custom_role(&role).await?;

    tracing::info!(role_id = %role.role_id, org_id = %role.organization_id, "Custom role created");
    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

async fn require_manage_permission(
    state: &AppState,
    ctx: &crate::middleware::AuthContext,
    organization_id: Uuid,
) -> Result<(), AppError> {
    let Some(role_code) = ctx
        .organizations
        .iter()
        .find(|t| t.organization_id == organization_id)
        .map(|t| t.role_code.clone())
    else {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "No membership in target organization"
        )));
    };

    let permissions = state
        .roles
        .permissions_for_role(organization_id, &role_code)
        .await?;
    if !rbac::has_permission(&permissions, MANAGE_ROLES_PERMISSION) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission: {}",
            MANAGE_ROLES_PERMISSION
        )));
    }
    Ok(())
}
