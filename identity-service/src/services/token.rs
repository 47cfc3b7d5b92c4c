//! Token service - signed bearer tokens embedding identity, tenant
//! context, and the accessible-org list.
//!
//! A verified token is never sufficient authorization on its own: every
//! verification must be paired with a live session check so revocation
//! takes effect before token expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::IdentityError;
use crate::models::{TenantSummary, User};

/// One accessible organization, as embedded in the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgClaim {
    pub id: Uuid,
    pub slug: String,
    pub role: String,
}

impl From<&TenantSummary> for OrgClaim {
    fn from(t: &TenantSummary) -> Self {
        Self {
            id: t.organization_id,
            slug: t.org_slug.clone(),
            role: t.role_code.clone(),
        }
    }
}

/// The real actor behind an impersonation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpersonatorClaims {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
}

/// Bearer token claims.
///
/// `sid` names the backing session: an ordinary session for normal
/// tokens, an impersonation session when `impersonator` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub orgs: Vec<OrgClaim>,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impersonator: Option<ImpersonatorClaims>,
}

impl IdentityClaims {
    /// Structural check for impersonation tokens; downstream writes
    /// performed under one must be flagged as impersonated.
    pub fn is_impersonation(&self) -> bool {
        self.impersonator.is_some()
    }
}

/// Token service signing with a symmetric key.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_days: i64,
}

impl TokenService {
    pub fn new(signing_secret: &Secret<String>, expiry_days: i64) -> Self {
        let secret = signing_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiry_days,
        }
    }

    /// Issue a token for a user acting in the given tenant context.
    pub fn issue(
        &self,
        user: &User,
        session_id: Uuid,
        active: Option<&TenantSummary>,
        tenants: &[TenantSummary],
    ) -> Result<String, IdentityError> {
        let claims = self.build_claims(user, session_id, active, tenants, None);
        self.sign(&claims)
    }

    /// Issue an impersonation token: the target's identity with the
    /// real actor carried alongside it.
    pub fn issue_impersonation(
        &self,
        target: &User,
        impersonation_id: Uuid,
        active: Option<&TenantSummary>,
        tenants: &[TenantSummary],
        impersonator: ImpersonatorClaims,
    ) -> Result<String, IdentityError> {
        let claims =
            self.build_claims(target, impersonation_id, active, tenants, Some(impersonator));
        self.sign(&claims)
    }

    /// Verify a token. Fails with `InvalidToken` on bad signature or
    /// expiry; internal detail is not leaked to callers.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<IdentityClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| IdentityError::InvalidToken)
    }

    /// Token expiry in seconds (mirrored by the cookie max-age).
    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_days * 24 * 3600
    }

    fn build_claims(
        &self,
        user: &User,
        session_id: Uuid,
        active: Option<&TenantSummary>,
        tenants: &[TenantSummary],
        impersonator: Option<ImpersonatorClaims>,
    ) -> IdentityClaims {
        let now = Utc::now();
        IdentityClaims {
            sub: user.user_id,
            sid: session_id,
            email: user.email.clone(),
            org: active.map(|t| t.org_slug.clone()),
            org_id: active.map(|t| t.organization_id),
            role: active.map(|t| t.role_code.clone()),
            orgs: tenants.iter().map(OrgClaim::from).collect(),
            iat: now.timestamp(),
            exp: (now + Duration::days(self.expiry_days)).timestamp(),
            impersonator,
        }
    }

    fn sign(&self, claims: &IdentityClaims) -> Result<String, IdentityError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|_| IdentityError::InvalidToken)
    }
}
