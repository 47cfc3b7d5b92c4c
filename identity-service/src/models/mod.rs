pub mod audit;
pub mod impersonation;
pub mod invitation;
pub mod magic_link;
pub mod membership;
pub mod organization;
pub mod rate_limit;
pub mod role;
pub mod session;
pub mod super_admin;
pub mod user;

pub use audit::AuditLogEntry;
pub use impersonation::{ImpersonationSession, IMPERSONATION_DURATION_MINUTES};
pub use invitation::{Invitation, InvitationState};
pub use magic_link::{MagicLink, MagicLinkPurpose};
pub use membership::{Membership, TenantSummary, UserTenant};
pub use organization::{OrgState, Organization};
pub use rate_limit::{IpAllowlistEntry, RateLimitWindow};
pub use role::CustomRole;
pub use session::{RequestMeta, Session};
pub use super_admin::{SuperAdminSession, SuperAdminUser};
pub use user::{User, UserState};
