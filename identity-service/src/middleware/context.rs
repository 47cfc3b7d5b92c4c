//! Request context resolution.
//!
//! Every inbound request is resolved to a context through a prioritized
//! chain, first match wins:
//!
//! 1. Trusted gateway headers carrying tenant/user ids directly. Only a
//!    trusted upstream boundary may set these; the deployment MUST
//!    strip them from outside traffic or this becomes an
//!    authentication bypass.
//! 2. The signed bearer token in the http-only session cookie,
//!    verified and then paired with a live session check.
//! 3. The `{tenant}.domain.tld` subdomain (excluding `www`), as an
//!    identity-less tenant hint.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{RequestMeta, TenantSummary};
use crate::services::{IdentityClaims, ImpersonatorClaims};
use crate::AppState;

/// Name of the http-only cookie carrying the signed bearer token.
pub const SESSION_COOKIE: &str = "session";

/// Trusted gateway headers.
pub mod trusted_headers {
    pub const TENANT_ID: &str = "x-tenant-id";
    pub const TENANT_SLUG: &str = "x-tenant-slug";
    pub const USER_ID: &str = "x-user-id";
    pub const USER_ROLE: &str = "x-user-role";
    pub const SESSION_ID: &str = "x-session-id";
}

/// How the request context was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    TrustedHeaders,
    SessionCookie,
    Subdomain,
    Anonymous,
}

/// Per-request context. Identity fields are only set when a credential
/// path established them.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: Option<Uuid>,
    pub tenant_slug: Option<String>,
    pub user_id: Option<Uuid>,
    pub source: ContextSource,
}

impl RequestContext {
    fn anonymous() -> Self {
        Self {
            tenant_id: None,
            tenant_slug: None,
            user_id: None,
            source: ContextSource::Anonymous,
        }
    }
}

/// Fully escalated authentication context, re-queried from the store.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub tenant_slug: Option<String>,
    pub role_code: Option<String>,
    pub organizations: Vec<TenantSummary>,
    pub impersonator: Option<ImpersonatorClaims>,
}

impl AuthContext {
    /// True when the effective identity is an impersonated one.
    pub fn is_impersonated(&self) -> bool {
        self.impersonator.is_some()
    }
}

/// Middleware that resolves the request context and, when a credential
/// path succeeds, the full `AuthContext`.
pub async fn request_context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (ctx, auth) = resolve_context(&state, req.headers()).await?;
    req.extensions_mut().insert(ctx);
    if let Some(auth) = auth {
        req.extensions_mut().insert(auth);
    }
    Ok(next.run(req).await)
}

async fn resolve_context(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(RequestContext, Option<AuthContext>), AppError> {
    // 1. Trusted gateway headers
    if has_any_trusted_header(headers) {
        return resolve_from_headers(state, headers).await;
    }

    // 2. Bearer token in the session cookie
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(claims) = state.tokens.verify(cookie.value()) {
            if let Some(auth) = resolve_from_claims(state, claims).await? {
                let ctx = RequestContext {
                    tenant_id: auth.tenant_id,
                    tenant_slug: auth.tenant_slug.clone(),
                    user_id: Some(auth.user_id),
                    source: ContextSource::SessionCookie,
                };
                return Ok((ctx, Some(auth)));
            }
        }
        // An invalid or revoked credential is anonymity, not a fault
    }

    // 3. Subdomain tenant hint (no identity)
    if let Some(slug) = subdomain_slug(headers) {
        if let Some(org) = state.store.find_org_by_slug(&slug).await? {
            return Ok((
                RequestContext {
                    tenant_id: Some(org.organization_id),
                    tenant_slug: Some(org.org_slug),
                    user_id: None,
                    source: ContextSource::Subdomain,
                },
                None,
            ));
        }
    }

    Ok((RequestContext::anonymous(), None))
}

fn has_any_trusted_header(headers: &HeaderMap) -> bool {
    headers.contains_key(trusted_headers::USER_ID)
        || headers.contains_key(trusted_headers::TENANT_ID)
        || headers.contains_key(trusted_headers::TENANT_SLUG)
}

async fn resolve_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(RequestContext, Option<AuthContext>), AppError> {
    let user_id = header_str(headers, trusted_headers::USER_ID)
        .and_then(|v| v.parse::<Uuid>().ok());
    let session_id = header_str(headers, trusted_headers::SESSION_ID)
        .and_then(|v| v.parse::<Uuid>().ok());

    // Tenant context by id first, slug second
    let organization = match header_str(headers, trusted_headers::TENANT_ID)
        .and_then(|v| v.parse::<Uuid>().ok())
    {
        Some(id) => state.store.find_org_by_id(id).await?,
        None => match header_str(headers, trusted_headers::TENANT_SLUG) {
            Some(slug) => state.store.find_org_by_slug(&slug).await?,
            None => None,
        },
    };

    let mut ctx = RequestContext {
        tenant_id: organization.as_ref().map(|o| o.organization_id),
        tenant_slug: organization.as_ref().map(|o| o.org_slug.clone()),
        user_id,
        source: ContextSource::TrustedHeaders,
    };

    let Some(user_id) = user_id else {
        return Ok((ctx, None));
    };
    let Some(user) = state
        .store
        .find_user_by_id(user_id)
        .await?
        .filter(|u| u.is_active())
    else {
        ctx.user_id = None;
        return Ok((ctx, None));
    };

    let organizations: Vec<TenantSummary> = state
        .store
        .list_user_tenants(user_id)
        .await?
        .iter()
        .filter(|t| t.is_accessible())
        .map(TenantSummary::from)
        .collect();

    let role_code = header_str(headers, trusted_headers::USER_ROLE).or_else(|| {
        ctx.tenant_id.and_then(|tenant_id| {
            organizations
                .iter()
                .find(|t| t.organization_id == tenant_id)
                .map(|t| t.role_code.clone())
        })
    });

    let auth = AuthContext {
        user_id,
        email: user.email,
        session_id,
        tenant_id: ctx.tenant_id,
        tenant_slug: ctx.tenant_slug.clone(),
        role_code,
        organizations,
        impersonator: None,
    };
    Ok((ctx, Some(auth)))
}

/// Escalate verified claims to a full context. The signature check has
/// passed; this pairs it with a live session (or impersonation session)
/// check and re-queries user and memberships from the store.
async fn resolve_from_claims(
    state: &AppState,
    claims: IdentityClaims,
) -> Result<Option<AuthContext>, AppError> {
    if claims.is_impersonation() {
        if state
            .impersonations
            .validate_impersonation_session(claims.sid)
            .await?
            .is_none()
        {
            return Ok(None);
        }
    } else if state.sessions.validate_session_by_id(claims.sid).await?.is_none() {
        return Ok(None);
    }

    let Some(user) = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active())
    else {
        return Ok(None);
    };

    let organizations: Vec<TenantSummary> = state
        .store
        .list_user_tenants(user.user_id)
        .await?
        .iter()
        .filter(|t| t.is_accessible())
        .map(TenantSummary::from)
        .collect();

    // The active tenant is re-derived from live memberships; the token
    // is a hint, not the authority
    let active = claims
        .org_id
        .and_then(|org_id| organizations.iter().find(|t| t.organization_id == org_id));

    Ok(Some(AuthContext {
        user_id: user.user_id,
        email: user.email,
        session_id: Some(claims.sid),
        tenant_id: active.map(|t| t.organization_id),
        tenant_slug: active.map(|t| t.org_slug.clone()),
        role_code: active.map(|t| t.role_code.clone()),
        organizations,
        impersonator: claims.impersonator,
    }))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Extract `{tenant}` from `{tenant}.domain.tld`, excluding `www` and
/// bare or two-label hosts.
fn subdomain_slug(headers: &HeaderMap) -> Option<String> {
    let host = header_str(headers, header::HOST.as_str())?;
    let host = host.split(':').next()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return None;
    }
    let first = labels[0];
    if first.is_empty() || first.eq_ignore_ascii_case("www") {
        return None;
    }
    Some(first.to_string())
}

/// Extractor for the resolved request context.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(RequestContext::anonymous))
    }
}

/// Extractor requiring an authenticated identity (`requireAuth`).
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication required")))
    }
}

/// Extractor for request metadata (client IP and user agent).
pub struct Meta(pub RequestMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Meta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                parts
                    .extensions
                    .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                    .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
            });

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(Meta(RequestMeta { ip, user_agent }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_host(host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        headers
    }

    #[test]
    fn test_subdomain_slug_extraction() {
        assert_eq!(
            subdomain_slug(&headers_with_host("acme.platform.test")),
            Some("acme".to_string())
        );
        assert_eq!(
            subdomain_slug(&headers_with_host("acme.platform.test:8080")),
            Some("acme".to_string())
        );
        assert_eq!(subdomain_slug(&headers_with_host("www.platform.test")), None);
        assert_eq!(subdomain_slug(&headers_with_host("platform.test")), None);
        assert_eq!(subdomain_slug(&headers_with_host("localhost")), None);
    }
}
