//! Session manager - ordinary user sessions over opaque tokens.

use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{RequestMeta, Session};
use crate::store::IdentityStore;
use crate::utils;

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn IdentityStore>,
    lifetime_days: i64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn IdentityStore>, lifetime_days: i64) -> Self {
        Self {
            store,
            lifetime_days,
        }
    }

    /// Create a session for a user. Returns the stored session and the
    /// raw token; only the token's hash is persisted.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
        meta: &RequestMeta,
    ) -> Result<(Session, String), AppError> {
        let raw_token = utils::generate_token();
        let session = Session::new(
            user_id,
            organization_id,
            utils::hash_token(&raw_token),
            self.lifetime_days,
            meta,
        );
        self.store.insert_session(&session).await?;

        tracing::info!(user_id = %user_id, session_id = %session.session_id, "Session created");
        Ok((session, raw_token))
    }

    /// Validate a raw session token. Any mismatch - unknown hash,
    /// revoked, or expired - is `None`, never an error.
    pub async fn validate_session(&self, raw_token: &str) -> Result<Option<Session>, AppError> {
        let session = self
            .store
            .find_session_by_token_hash(&utils::hash_token(raw_token))
            .await?;
        Ok(session.filter(|s| s.is_valid()))
    }

    /// Same guarantee keyed by id; used after token-signature
    /// verification to avoid re-hashing.
    pub async fn validate_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<Session>, AppError> {
        let session = self.store.find_session_by_id(session_id).await?;
        Ok(session.filter(|s| s.is_valid()))
    }

    /// Idempotent revocation of a single session.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<(), AppError> {
        self.store.revoke_session(session_id, Utc::now()).await?;
        tracing::info!(session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Revoke every open session for a user. Returns the revoked count.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all_sessions(user_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    /// Delete sessions past their expiry. Intended to be driven by an
    /// external scheduler; safe to run concurrently with live traffic.
    pub async fn sweep_expired_sessions(&self) -> Result<u64, AppError> {
        let deleted = self.store.delete_expired_sessions(Utc::now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Expired sessions swept");
        }
        Ok(deleted)
    }
}
