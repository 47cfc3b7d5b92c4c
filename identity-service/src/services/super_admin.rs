//! Super admin access control - the elevated session lifecycle, MFA
//! gating, rate limiting, IP allow-listing, and the immutable audit
//! trail around it.

use chrono::{Duration, Utc};
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use super::error::IdentityError;
use crate::models::{
    super_admin::revoke_reason, AuditLogEntry, IpAllowlistEntry, RateLimitWindow, RequestMeta,
    SuperAdminSession, SuperAdminUser, UserState,
};
use crate::store::IdentityStore;
use crate::utils;

#[derive(Clone)]
pub struct SuperAdminService {
    store: Arc<dyn IdentityStore>,
    session_lifetime_hours: i64,
    inactivity_timeout_minutes: i32,
    mfa_challenge_minutes: i64,
}

impl SuperAdminService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        session_lifetime_hours: i64,
        inactivity_timeout_minutes: i32,
        mfa_challenge_minutes: i64,
    ) -> Self {
        Self {
            store,
            session_lifetime_hours,
            inactivity_timeout_minutes,
            mfa_challenge_minutes,
        }
    }

    /// Look up an active super admin record.
    pub async fn find_active(&self, user_id: Uuid) -> Result<Option<SuperAdminUser>, AppError> {
        let admin = self.store.find_super_admin(user_id).await?;
        Ok(admin.filter(|a| a.is_active))
    }

    /// Create a new elevated session.
    ///
    /// All prior sessions for the user are revoked in the same store
    /// transaction that inserts the new one, so two sessions are never
    /// simultaneously valid.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(SuperAdminSession, String), IdentityError> {
        let Some(admin) = self.find_active(user_id).await? else {
            return Err(IdentityError::PermissionDenied(
                "Not an active super admin".to_string(),
            ));
        };

        let raw_token = utils::generate_token();
        let mut session = SuperAdminSession::new(
            user_id,
            utils::hash_token(&raw_token),
            self.session_lifetime_hours,
            self.inactivity_timeout_minutes,
            meta,
        );
        if admin.mfa_enabled {
            session.mfa_challenge_expiry_utc =
                Some(Utc::now() + Duration::minutes(self.mfa_challenge_minutes));
        } else {
            // No MFA on the account; the session is fully trusted at login
            session.mfa_verified = true;
        }

        let superseded = self.store.replace_super_admin_session(&session).await?;
        if superseded > 0 {
            tracing::warn!(user_id = %user_id, superseded, "Prior super admin sessions revoked");
        }

        if let Some(ip) = &meta.ip {
            self.store
                .update_super_admin_last_access_ip(user_id, ip)
                .await?;
        }

        self.log_audit_action(
            AuditLogEntry::new("super_admin.login", Some(user_id))
                .with_resource("super_admin_session", session.session_id.to_string())
                .with_request_meta(meta),
        )
        .await?;

        tracing::info!(user_id = %user_id, session_id = %session.session_id, "Super admin session created");
        Ok((session, raw_token))
    }

    /// Validate an elevated session token.
    ///
    /// Checks hash, expiry, revocation, and the sliding inactivity
    /// window; a lapsed window auto-revokes with reason
    /// `inactivity_timeout`. Success bumps the activity timestamp.
    pub async fn validate_session(
        &self,
        raw_token: &str,
    ) -> Result<Option<SuperAdminSession>, AppError> {
        let Some(session) = self
            .store
            .find_super_admin_session_by_token_hash(&utils::hash_token(raw_token))
            .await?
        else {
            return Ok(None);
        };

        if session.is_revoked() || session.is_expired() {
            return Ok(None);
        }

        let now = Utc::now();
        if session.is_inactive(now) {
            self.store
                .revoke_super_admin_session(session.session_id, revoke_reason::INACTIVITY, now)
                .await?;
            tracing::info!(session_id = %session.session_id, "Super admin session timed out");
            return Ok(None);
        }

        self.store
            .touch_super_admin_session(session.session_id, now)
            .await?;
        Ok(Some(SuperAdminSession {
            last_activity_utc: now,
            ..session
        }))
    }

    /// Open a fresh MFA challenge window on the session.
    pub async fn set_mfa_challenge_expiration(
        &self,
        session_id: Uuid,
    ) -> Result<(), IdentityError> {
        let expiry = Utc::now() + Duration::minutes(self.mfa_challenge_minutes);
        self.store.set_mfa_challenge(session_id, expiry).await?;
        Ok(())
    }

    /// Mark the session fully trusted after the upstream MFA provider
    /// accepted the challenge. Fails if the challenge window lapsed.
    pub async fn mark_mfa_verified(&self, session_id: Uuid) -> Result<(), IdentityError> {
        let Some(session) = self.store.find_super_admin_session_by_id(session_id).await? else {
            return Err(IdentityError::NotFound("Super admin session".to_string()));
        };
        if !session.mfa_challenge_open(Utc::now()) {
            return Err(IdentityError::Authentication(
                "MFA challenge expired".to_string(),
            ));
        }
        self.store.mark_mfa_verified(session_id).await?;
        tracing::info!(session_id = %session_id, "MFA verified");
        Ok(())
    }

    /// Revoke a single elevated session (logout).
    pub async fn revoke_session(&self, session_id: Uuid, reason: &str) -> Result<(), AppError> {
        self.store
            .revoke_super_admin_session(session_id, reason, Utc::now())
            .await
    }

    /// Append-only audit hook; every elevated action goes through here.
    pub async fn log_audit_action(&self, entry: AuditLogEntry) -> Result<(), AppError> {
        self.store.append_audit_entry(&entry).await
    }

    pub async fn list_audit_entries(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        self.store.list_audit_entries(tenant_id, limit).await
    }

    /// Fixed-window rate limit keyed by (user, bucket). Returns false
    /// when the request would exceed `limit` within the window.
    ///
    /// The read-then-write is not transactional; concurrent requests
    /// can overshoot the limit slightly at window boundaries.
    pub async fn check_rate_limit(
        &self,
        user_id: Uuid,
        bucket: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let window = match self.store.find_rate_limit_window(user_id, bucket).await? {
            Some(window) if !window.is_expired(window_seconds, now) => {
                if window.count >= limit {
                    tracing::warn!(user_id = %user_id, bucket, "Rate limit exceeded");
                    return Ok(false);
                }
                RateLimitWindow {
                    count: window.count + 1,
                    ..window
                }
            }
            // First use, or the previous window lapsed
            _ => RateLimitWindow::new(user_id, bucket.to_string()),
        };
        self.store.put_rate_limit_window(&window).await?;
        Ok(true)
    }

    /// IP allowlist check. Fail-open: an empty allowlist passes every
    /// IP; once any entry exists, only listed IPs pass.
    pub async fn check_ip_allowlist(&self, ip: &str) -> Result<bool, AppError> {
        let entries = self.store.list_ip_allowlist().await?;
        if entries.is_empty() {
            return Ok(true);
        }
        Ok(entries.iter().any(|e| e.ip == ip))
    }

    /// Add an allowlist entry (audited settings change).
    pub async fn add_ip_allowlist_entry(
        &self,
        actor_id: Uuid,
        ip: String,
        note: Option<String>,
        meta: &RequestMeta,
    ) -> Result<IpAllowlistEntry, AppError> {
        let entry = IpAllowlistEntry::new(ip, note, Some(actor_id));
        self.store.insert_ip_allowlist_entry(&entry).await?;
        self.log_audit_action(
            AuditLogEntry::new("super_admin.ip_allowlist.add", Some(actor_id))
                .with_resource("ip_allowlist", entry.entry_id.to_string())
                .with_snapshots(None, Some(json!({ "ip": entry.ip })))
                .with_request_meta(meta),
        )
        .await?;
        Ok(entry)
    }

    /// Grant super admin status to a user.
    pub async fn grant_super_admin(
        &self,
        actor_id: Uuid,
        target_user_id: Uuid,
        can_impersonate: bool,
        can_manage_super_admins: bool,
        meta: &RequestMeta,
    ) -> Result<SuperAdminUser, IdentityError> {
        self.require_manager(actor_id).await?;

        let Some(target) = self.store.find_user_by_id(target_user_id).await? else {
            return Err(IdentityError::NotFound("User".to_string()));
        };
        if self.store.find_super_admin(target_user_id).await?.is_some() {
            return Err(IdentityError::Conflict(
                "User already has a super admin record".to_string(),
            ));
        }

        let mut admin = SuperAdminUser::new(target_user_id, Some(actor_id));
        admin.can_impersonate = can_impersonate;
        admin.can_manage_super_admins = can_manage_super_admins;
        self.store.insert_super_admin(&admin).await?;

        self.log_audit_action(
            AuditLogEntry::new("super_admin.granted", Some(actor_id))
                .with_resource("super_admin", target_user_id.to_string())
                .with_snapshots(
                    None,
                    Some(json!({
                        "email": target.email,
                        "can_impersonate": can_impersonate,
                        "can_manage_super_admins": can_manage_super_admins,
                    })),
                )
                .with_request_meta(meta),
        )
        .await?;

        tracing::info!(actor = %actor_id, target = %target_user_id, "Super admin granted");
        Ok(admin)
    }

    /// Revoke a user's super admin status.
    ///
    /// Self-revocation is always refused, and the operation fails if it
    /// would leave the platform with no active super admin.
    pub async fn revoke_super_admin(
        &self,
        actor_id: Uuid,
        target_user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), IdentityError> {
        if actor_id == target_user_id {
            return Err(IdentityError::Validation(
                "Cannot revoke your own super admin status".to_string(),
            ));
        }
        self.require_manager(actor_id).await?;

        let Some(target) = self.find_active(target_user_id).await? else {
            return Err(IdentityError::NotFound("Active super admin".to_string()));
        };

        if self.store.count_active_super_admins().await? <= 1 {
            return Err(IdentityError::Validation(
                "Cannot revoke the last active super admin".to_string(),
            ));
        }

        self.store
            .set_super_admin_active(target_user_id, false)
            .await?;
        self.store
            .revoke_super_admin_sessions_for_user(
                target_user_id,
                revoke_reason::ADMIN_DISABLED,
                Utc::now(),
            )
            .await?;

        self.log_audit_action(
            AuditLogEntry::new("super_admin.revoked", Some(actor_id))
                .with_resource("super_admin", target_user_id.to_string())
                .with_snapshots(
                    Some(json!({ "is_active": true, "can_impersonate": target.can_impersonate })),
                    Some(json!({ "is_active": false })),
                )
                .with_request_meta(meta),
        )
        .await?;

        tracing::info!(actor = %actor_id, target = %target_user_id, "Super admin revoked");
        Ok(())
    }

    /// Disable a user account: sets the state, revokes every ordinary
    /// session, and - when the target is a super admin - applies the
    /// same last-admin protections as `revoke_super_admin`.
    pub async fn disable_user(
        &self,
        actor_id: Uuid,
        target_user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), IdentityError> {
        if actor_id == target_user_id {
            return Err(IdentityError::Validation(
                "Cannot disable your own account".to_string(),
            ));
        }

        let Some(target) = self.store.find_user_by_id(target_user_id).await? else {
            return Err(IdentityError::NotFound("User".to_string()));
        };

        if self.find_active(target_user_id).await?.is_some() {
            if self.store.count_active_super_admins().await? <= 1 {
                return Err(IdentityError::Validation(
                    "Cannot disable the last active super admin".to_string(),
                ));
            }
            self.store
                .set_super_admin_active(target_user_id, false)
                .await?;
            self.store
                .revoke_super_admin_sessions_for_user(
                    target_user_id,
                    revoke_reason::ADMIN_DISABLED,
                    Utc::now(),
                )
                .await?;
        }

        self.store
            .update_user_state(target_user_id, UserState::Disabled.as_str())
            .await?;
        self.store
            .revoke_all_sessions(target_user_id, Utc::now())
            .await?;

        self.log_audit_action(
            AuditLogEntry::new("user.disabled", Some(actor_id))
                .with_resource("user", target_user_id.to_string())
                .with_snapshots(
                    Some(json!({ "user_state_code": target.user_state_code })),
                    Some(json!({ "user_state_code": UserState::Disabled.as_str() })),
                )
                .with_request_meta(meta),
        )
        .await?;

        tracing::info!(actor = %actor_id, target = %target_user_id, "User disabled");
        Ok(())
    }

    /// The actor must be an active super admin with the
    /// `can_manage_super_admins` capability.
    async fn require_manager(&self, actor_id: Uuid) -> Result<SuperAdminUser, IdentityError> {
        let Some(actor) = self.find_active(actor_id).await? else {
            return Err(IdentityError::PermissionDenied(
                "Not an active super admin".to_string(),
            ));
        };
        if !actor.can_manage_super_admins {
            return Err(IdentityError::PermissionDenied(
                "Missing can_manage_super_admins capability".to_string(),
            ));
        }
        Ok(actor)
    }
}
