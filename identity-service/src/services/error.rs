use service_core::error::AppError;
use thiserror::Error;

/// Discrete impersonation failure codes, stable across the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpersonationErrorCode {
    ReasonRequired,
    NotSuperAdmin,
    TargetNotFound,
    CannotImpersonateSuperAdmin,
    SessionExpired,
    SessionNotFound,
    NoTenantAccess,
}

impl ImpersonationErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpersonationErrorCode::ReasonRequired => "REASON_REQUIRED",
            ImpersonationErrorCode::NotSuperAdmin => "NOT_SUPER_ADMIN",
            ImpersonationErrorCode::TargetNotFound => "TARGET_NOT_FOUND",
            ImpersonationErrorCode::CannotImpersonateSuperAdmin => "CANNOT_IMPERSONATE_SUPER_ADMIN",
            ImpersonationErrorCode::SessionExpired => "SESSION_EXPIRED",
            ImpersonationErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ImpersonationErrorCode::NoTenantAccess => "NO_TENANT_ACCESS",
        }
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Impersonation error: {}", .0.as_str())]
    Impersonation(ImpersonationErrorCode),

    #[error("Tenant access denied: {0}")]
    TenantAccess(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Authentication(msg) => AppError::AuthError(anyhow::anyhow!(msg)),
            IdentityError::InvalidToken => AppError::AuthError(anyhow::anyhow!("Invalid token")),
            IdentityError::Impersonation(code) => match code {
                ImpersonationErrorCode::ReasonRequired => {
                    AppError::BadRequest(anyhow::anyhow!(code.as_str()))
                }
                ImpersonationErrorCode::TargetNotFound
                | ImpersonationErrorCode::SessionNotFound => {
                    AppError::NotFound(anyhow::anyhow!(code.as_str()))
                }
                ImpersonationErrorCode::SessionExpired => {
                    AppError::AuthError(anyhow::anyhow!(code.as_str()))
                }
                ImpersonationErrorCode::NotSuperAdmin
                | ImpersonationErrorCode::CannotImpersonateSuperAdmin
                | ImpersonationErrorCode::NoTenantAccess => {
                    AppError::Forbidden(anyhow::anyhow!(code.as_str()))
                }
            },
            IdentityError::TenantAccess(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            IdentityError::PermissionDenied(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            IdentityError::FeatureNotEnabled(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            IdentityError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            IdentityError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            IdentityError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            IdentityError::Store(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impersonation_codes_are_stable() {
        assert_eq!(
            ImpersonationErrorCode::ReasonRequired.as_str(),
            "REASON_REQUIRED"
        );
        assert_eq!(
            ImpersonationErrorCode::CannotImpersonateSuperAdmin.as_str(),
            "CANNOT_IMPERSONATE_SUPER_ADMIN"
        );
    }
}
