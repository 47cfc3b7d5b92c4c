//! Invitation handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::invitation::InvitationResponse;
use crate::services::rbac;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Permission gating invitation management.
const INVITE_PERMISSION: &str = "members.invite";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    pub organization_id: Uuid,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub role_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub display_name: Option<String>,
    pub password: Option<String>,
}

/// Invite a user into an organization.
pub async fn create_invitation(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_invite_permission(&state, &ctx, req.organization_id).await?;

    let (invitation, _raw_token) = state
        .invitations
        .create_invitation(req.organization_id, &req.email, &req.role_code, ctx.user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse::from(invitation)),
    ))
}

/// Accept an invitation (public; the token is the credential).
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(req): Json<AcceptInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, membership) = state
        .invitations
        .accept_invitation(&req.token, req.display_name, req.password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "user": user.sanitized(),
            "organization_id": membership.organization_id,
            "role_code": membership.role_code,
        })),
    ))
}

/// Rotate and re-deliver an invitation.
pub async fn resend_invitation(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invitation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state
        .store
        .find_invitation_by_id(invitation_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invitation not found")))?;

    require_invite_permission(&state, &ctx, invitation.organization_id).await?;

    let (invitation, _raw_token) = state
        .invitations
        .resend_invitation(invitation_id, ctx.user_id)
        .await?;

    Ok((StatusCode::OK, Json(InvitationResponse::from(invitation))))
}

/// RBAC gate: the caller must hold `members.invite` in the target
/// organization.
async fn require_invite_permission(
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
    if !rbac::has_permission(&permissions, INVITE_PERMISSION) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission: {}",
            INVITE_PERMISSION
        )));
    }
    Ok(())
}
