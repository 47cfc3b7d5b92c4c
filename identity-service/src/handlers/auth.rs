//! Authentication handlers: password login, magic links, logout.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

use crate::config::Environment;
use crate::middleware::{AuthUser, Meta, SESSION_COOKIE};
use crate::models::{impersonation::end_reason, MagicLinkPurpose, TenantSummary, User};
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MagicLinkRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
    pub email: String,
}

/// Login with email and password.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Meta(meta): Meta,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .filter(|u| u.is_active())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid credentials")))?;

    if !state.credentials.verify_password(&user, &req.password) {
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials")));
    }

    let (jar, body) = establish_session(&state, jar, user, &meta).await?;
    Ok((StatusCode::OK, jar, Json(body)))
}

/// Request a magic link by email.
///
/// Always answers with the same message so the endpoint cannot be used
/// to enumerate accounts.
pub async fn request_magic_link(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<MagicLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_magic_link_feature(&state)?;

    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .filter(|u| u.is_active());

    if let Some(user) = user {
        state
            .credentials
            .create_magic_link(&user.email, MagicLinkPurpose::Login)
            .await?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "If the address is registered, a sign-in link is on its way."
        })),
    ))
}

/// Redeem a magic link (single use).
pub async fn verify_magic_link(
    State(state): State<AppState>,
    jar: CookieJar,
    Meta(meta): Meta,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_magic_link_feature(&state)?;

    let link = state
        .credentials
        .verify_magic_link(&query.email, &query.token)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid or expired link")))?;

    let user = state
        .store
        .find_user_by_email(&link.email)
        .await?
        .filter(|u| u.is_active())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid or expired link")))?;

    // The link round-trip proves the address
    if !user.email_verified {
        state.store.mark_email_verified(user.user_id).await?;
    }

    let (jar, body) = establish_session(&state, jar, user, &meta).await?;
    Ok((StatusCode::OK, jar, Json(body)))
}

/// Log out: revoke the backing session (or end the impersonation) and
/// clear the cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    if let Some(session_id) = ctx.session_id {
        if let Some(impersonator) = &ctx.impersonator {
            state
                .impersonations
                .end_impersonation(session_id, end_reason::MANUAL, Some(impersonator.user_id))
                .await?;
        } else {
            state.sessions.revoke_session(session_id).await?;
        }
    }

    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    Ok((
        StatusCode::OK,
        jar,
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

/// The authenticated caller's profile and tenant context.
pub async fn me(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .find_user_by_id(ctx.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(json!({
        "user": user.sanitized(),
        "tenant_id": ctx.tenant_id,
        "tenant_slug": ctx.tenant_slug,
        "role": ctx.role_code,
        "organizations": ctx.organizations,
        "impersonated": ctx.is_impersonated(),
        "impersonator": ctx.impersonator,
    })))
}

/// Create a session + token for a fully authenticated user and set the
/// session cookie.
async fn establish_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
    meta: &crate::models::RequestMeta,
) -> Result<(CookieJar, serde_json::Value), AppError> {
    let tenants: Vec<TenantSummary> = state
        .tenants
        .get_user_tenants(user.user_id)
        .await?
        .iter()
        .filter(|t| t.is_accessible())
        .map(TenantSummary::from)
        .collect();

    let active = tenants
        .iter()
        .find(|t| t.is_default)
        .or_else(|| tenants.first())
        .cloned();

    let (session, _raw_token) = state
        .sessions
        .create_session(
            user.user_id,
            active.as_ref().map(|t| t.organization_id),
            meta,
        )
        .await?;

    let token = state
        .tokens
        .issue(&user, session.session_id, active.as_ref(), &tenants)
        .map_err(AppError::from)?;

    state
        .store
        .update_user_last_login(user.user_id, Utc::now())
        .await?;

    let welcome = state
        .tenants
        .should_show_welcome_modal(user.user_id)
        .await?;

    let jar = jar.add(session_cookie(state, token.clone()));
    let body = json!({
        "user": user.sanitized(),
        "token": token,
        "organizations": tenants,
        "active_organization": active,
        "should_show_welcome_modal": welcome,
    });
    Ok((jar, body))
}

fn require_magic_link_feature(state: &AppState) -> Result<(), AppError> {
    if state.config.features.magic_link_login {
        Ok(())
    } else {
        Err(crate::services::IdentityError::FeatureNotEnabled(
            "magic_link_login".to_string(),
        )
        .into())
    }
}

/// The http-only, same-site session cookie; `Secure` outside dev. Its
/// max-age mirrors the token expiry.
pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(state.config.environment == Environment::Prod);
    cookie.set_max_age(time::Duration::seconds(state.tokens.expiry_seconds()));
    cookie
}
