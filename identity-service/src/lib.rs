pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    CredentialService, EmailProvider, ImpersonationService, InvitationService, RoleResolver,
    SessionManager, SuperAdminService, TenantContextService, TokenService,
};
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub email: Arc<dyn EmailProvider>,
    pub tokens: TokenService,
    pub sessions: SessionManager,
    pub credentials: CredentialService,
    pub super_admins: SuperAdminService,
    pub impersonations: ImpersonationService,
    pub tenants: TenantContextService,
    pub invitations: InvitationService,
    pub roles: RoleResolver,
    pub login_rate_limiter: IpRateLimiter,
    pub magic_link_rate_limiter: IpRateLimiter,
    pub admin_login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Assemble the service graph over a store and email provider.
    pub fn build(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        email: Arc<dyn EmailProvider>,
    ) -> Self {
        let tokens = TokenService::new(
            &config.token.signing_secret,
            config.token.token_expiry_days,
        );
        let sessions = SessionManager::new(store.clone(), config.token.session_lifetime_days);
        let credentials = CredentialService::new(
            store.clone(),
            email.clone(),
            config.base_url.clone(),
            config.magic_link_hours,
        );
        let super_admins = SuperAdminService::new(
            store.clone(),
            config.super_admin.session_lifetime_hours,
            config.super_admin.inactivity_timeout_minutes,
            config.super_admin.mfa_challenge_minutes,
        );
        let impersonations = ImpersonationService::new(store.clone(), tokens.clone());
        let tenants = TenantContextService::new(store.clone(), tokens.clone());
        let invitations = InvitationService::new(
            store.clone(),
            email.clone(),
            config.base_url.clone(),
            config.invitation_days,
        );
        let roles = RoleResolver::new(store.clone());

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let magic_link_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.magic_link_attempts,
            config.rate_limit.magic_link_window_seconds,
        );
        let admin_login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.admin_login_attempts,
            config.rate_limit.admin_login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config,
            store,
            email,
            tokens,
            sessions,
            credentials,
            super_admins,
            impersonations,
            tenants,
            invitations,
            roles,
            login_rate_limiter,
            magic_link_rate_limiter,
            admin_login_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Elevated routes behind the super admin session middleware
    let admin_routes = Router::new()
        .route("/admin/mfa/verify", post(handlers::admin::verify_mfa))
        .route("/admin/logout", post(handlers::admin::admin_logout))
        .route(
            "/admin/impersonate",
            post(handlers::admin::start_impersonation),
        )
        .route(
            "/admin/impersonate/end",
            post(handlers::admin::end_impersonation),
        )
        .route(
            "/admin/super-admins",
            post(handlers::admin::grant_super_admin),
        )
        .route(
            "/admin/super-admins/:user_id",
            delete(handlers::admin::revoke_super_admin),
        )
        .route(
            "/admin/users/:user_id/disable",
            post(handlers::admin::disable_user),
        )
        .route(
            "/admin/ip-allowlist",
            post(handlers::admin::add_ip_allowlist_entry),
        )
        .route("/admin/audit", get(handlers::admin::list_audit_entries))
        .route(
            "/admin/maintenance/sweep",
            post(handlers::admin::run_maintenance_sweep),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::super_admin_auth_middleware,
        ));

    // Credential endpoints carry their own IP rate limits
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let magic_link_route = Router::new()
        .route("/auth/magic-link", post(handlers::auth::request_magic_link))
        .layer(from_fn_with_state(
            state.magic_link_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let admin_login_route = Router::new()
        .route("/admin/login", post(handlers::admin::admin_login))
        .layer(from_fn_with_state(
            state.admin_login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/verify", get(handlers::auth::verify_magic_link))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/tenants", get(handlers::tenants::list_tenants))
        .route("/tenants/switch", post(handlers::tenants::switch_tenant))
        .route(
            "/tenants/default",
            post(handlers::tenants::set_default_tenant),
        )
        .route("/roles", post(handlers::roles::create_custom_role))
        .route(
            "/invitations",
            post(handlers::invitations::create_invitation),
        )
        .route(
            "/invitations/accept",
            post(handlers::invitations::accept_invitation),
        )
        .route(
            "/invitations/:invitation_id/resend",
            post(handlers::invitations::resend_invitation),
        )
        .merge(login_route)
        .merge(magic_link_route)
        .merge(admin_login_route)
        .merge(admin_routes)
        // Resolve request context (headers -> cookie -> subdomain) for
        // every route
        .layer(from_fn_with_state(
            state.clone(),
            middleware::request_context_middleware,
        ))
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Tracing span per request
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

fn cors_layer(config: &IdentityConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(
            config
                .security
                .allowed_origins
                .iter()
                .filter_map(|o| {
                    o.parse::<axum::http::HeaderValue>()
                        .map_err(|e| {
                            tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                            e
                        })
                        .ok()
                })
                .collect::<Vec<axum::http::HeaderValue>>(),
        )
        .allow_credentials(true)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

/// Service health check.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
