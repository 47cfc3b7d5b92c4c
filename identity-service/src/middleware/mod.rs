pub mod admin;
pub mod context;

pub use admin::{super_admin_auth_middleware, SuperAdmin, SuperAdminContext};
pub use context::{
    request_context_middleware, AuthContext, AuthUser, ContextSource, Meta, RequestContext,
    SESSION_COOKIE,
};
