//! Services layer for the identity service.
//!
//! Business logic for sessions, tokens, credentials, RBAC, the
//! elevated super admin layer, impersonation, and tenant context.

mod credentials;
mod email;
pub mod error;
mod impersonation;
pub mod rbac;
mod session;
mod super_admin;
mod tenant;
mod token;

pub mod invitations;

pub use credentials::CredentialService;
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use error::{IdentityError, ImpersonationErrorCode};
pub use impersonation::ImpersonationService;
pub use invitations::InvitationService;
pub use rbac::RoleResolver;
pub use session::SessionManager;
pub use super_admin::SuperAdminService;
pub use tenant::TenantContextService;
pub use token::{IdentityClaims, ImpersonatorClaims, OrgClaim, TokenService};
