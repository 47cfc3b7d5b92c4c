//! Super admin authentication middleware.
//!
//! Elevated routes authenticate with the opaque super admin session
//! token as a bearer credential; the middleware also enforces the IP
//! allowlist before touching the session at all.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::{SuperAdminSession, SuperAdminUser};
use crate::AppState;

/// Elevated identity established for the request.
#[derive(Debug, Clone)]
pub struct SuperAdminContext {
    pub session: SuperAdminSession,
    pub admin: SuperAdminUser,
}

impl SuperAdminContext {
    /// Sensitive operations must gate on a fully trusted session.
    pub fn require_mfa_verified(&self) -> Result<(), AppError> {
        if self.session.mfa_verified {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "MFA verification required"
            )))
        }
    }
}

pub async fn super_admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&req);
    if let Some(ip) = &ip {
        if !state.super_admins.check_ip_allowlist(ip).await? {
            tracing::warn!(ip = %ip, "Super admin request from non-allowlisted IP");
            return Err(AppError::Forbidden(anyhow::anyhow!("IP not allowed")));
        }
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::AuthError(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let session = state
        .super_admins
        .validate_session(token)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid or expired session")))?;

    let admin = state
        .super_admins
        .find_active(session.user_id)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Super admin access revoked")))?;

    req.extensions_mut()
        .insert(SuperAdminContext { session, admin });

    Ok(next.run(req).await)
}

fn client_ip(req: &Request) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            req.extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
        })
}

/// Extractor for the elevated identity.
pub struct SuperAdmin(pub SuperAdminContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SuperAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SuperAdminContext>()
            .cloned()
            .map(SuperAdmin)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Super admin context missing from request extensions"
                ))
            })
    }
}
