//! Invitation service - emailed invitations bound to email + role +
//! tenant, with token rotation on resend.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::error::IdentityError;
use super::EmailProvider;
use crate::models::{AuditLogEntry, Invitation, Membership, User, UserState};
use crate::store::IdentityStore;
use crate::utils::{self, hash_password, Password};

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn IdentityStore>,
    email: Arc<dyn EmailProvider>,
    base_url: String,
    lifetime_days: i64,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        email: Arc<dyn EmailProvider>,
        base_url: String,
        lifetime_days: i64,
    ) -> Self {
        Self {
            store,
            email,
            base_url,
            lifetime_days,
        }
    }

    /// Create and deliver an invitation. A pending invitation for the
    /// same email and organization is a conflict, not a silent resend.
    pub async fn create_invitation(
        &self,
        organization_id: Uuid,
        email: &str,
        role_code: &str,
        invited_by: Uuid,
    ) -> Result<(Invitation, String), IdentityError> {
        let Some(organization) = self.store.find_org_by_id(organization_id).await? else {
            return Err(IdentityError::NotFound("Organization".to_string()));
        };
        if !organization.is_active() {
            return Err(IdentityError::TenantAccess(
                "Organization is suspended".to_string(),
            ));
        }
        if self
            .store
            .find_pending_invitation(organization_id, email)
            .await?
            .is_some()
        {
            return Err(IdentityError::Conflict(
                "An invitation is already pending for this email".to_string(),
            ));
        }

        let raw_token = utils::generate_token();
        let invitation = Invitation::new(
            organization_id,
            email.to_string(),
            role_code.to_string(),
            utils::hash_token(&raw_token),
            self.lifetime_days,
            invited_by,
        );
        self.store.insert_invitation(&invitation).await?;

        // Pre-provision the account in the invited state so the user
        // exists for audit and lookup before acceptance
        if self.store.find_user_by_email(&invitation.email).await?.is_none() {
            let user = User::new_invited(invitation.email.clone(), role_code.to_string());
            self.store.insert_user(&user).await?;
        }

        self.send(&invitation, &organization.org_label, &raw_token)
            .await?;

        self.store
            .append_audit_entry(
                &AuditLogEntry::new("invitation.created", Some(invited_by))
                    .with_resource("invitation", invitation.invitation_id.to_string())
                    .with_tenant(organization_id)
                    .with_snapshots(
                        None,
                        Some(json!({ "email": invitation.email, "role_code": role_code })),
                    ),
            )
            .await?;

        tracing::info!(email = %invitation.email, org = %organization.org_slug, "Invitation sent");
        Ok((invitation, raw_token))
    }

    /// Rotate the invitation's token and expiry and re-deliver it. The
    /// old token stops working immediately.
    pub async fn resend_invitation(
        &self,
        invitation_id: Uuid,
        actor_id: Uuid,
    ) -> Result<(Invitation, String), IdentityError> {
        let Some(invitation) = self.store.find_invitation_by_id(invitation_id).await? else {
            return Err(IdentityError::NotFound("Invitation".to_string()));
        };
        if invitation.is_accepted() {
            return Err(IdentityError::Conflict(
                "Invitation has already been accepted".to_string(),
            ));
        }
        let Some(organization) = self
            .store
            .find_org_by_id(invitation.organization_id)
            .await?
        else {
            return Err(IdentityError::NotFound("Organization".to_string()));
        };

        let raw_token = utils::generate_token();
        let expiry = Utc::now() + Duration::days(self.lifetime_days);
        self.store
            .rotate_invitation_token(invitation_id, &utils::hash_token(&raw_token), expiry)
            .await?;

        let invitation = Invitation {
            token_hash: utils::hash_token(&raw_token),
            expiry_utc: expiry,
            ..invitation
        };
        self.send(&invitation, &organization.org_label, &raw_token)
            .await?;

        self.store
            .append_audit_entry(
                &AuditLogEntry::new("invitation.resent", Some(actor_id))
                    .with_resource("invitation", invitation_id.to_string())
                    .with_tenant(invitation.organization_id),
            )
            .await?;

        Ok((invitation, raw_token))
    }

    /// Accept an invitation: creates or activates the user, creates the
    /// membership, and marks the invitation accepted.
    pub async fn accept_invitation(
        &self,
        raw_token: &str,
        display_name: Option<String>,
        password: Option<String>,
    ) -> Result<(User, Membership), IdentityError> {
        let Some(invitation) = self
            .store
            .find_invitation_by_token_hash(&utils::hash_token(raw_token))
            .await?
        else {
            return Err(IdentityError::NotFound("Invitation".to_string()));
        };
        if !invitation.is_valid() {
            return Err(IdentityError::Validation(
                "Invitation is expired or no longer pending".to_string(),
            ));
        }

        let user = match self.store.find_user_by_email(&invitation.email).await? {
            Some(user) if user.is_disabled() => {
                return Err(IdentityError::Validation(
                    "Account is disabled".to_string(),
                ));
            }
            Some(user) => {
                let mut user = user;
                if user.user_state_code == UserState::Invited.as_str() {
                    self.store
                        .update_user_state(user.user_id, UserState::Active.as_str())
                        .await?;
                    user.user_state_code = UserState::Active.as_str().to_string();
                }
                // The invitation round-trip proves the address
                if !user.email_verified {
                    self.store.mark_email_verified(user.user_id).await?;
                    user.email_verified = true;
                }
                if let Some(password) = password {
                    let hash = hash_password(&Password::new(password))
                        .map_err(|e| IdentityError::Validation(e.to_string()))?;
                    self.store
                        .update_user_password(user.user_id, hash.as_str())
                        .await?;
                    user.password_hash = Some(hash.into_string());
                }
                user
            }
            None => {
                let mut user = User::new(
                    invitation.email.clone(),
                    display_name,
                    invitation.role_code.clone(),
                );
                user.email_verified = true;
                if let Some(password) = password {
                    let hash = hash_password(&Password::new(password))
                        .map_err(|e| IdentityError::Validation(e.to_string()))?;
                    user.password_hash = Some(hash.into_string());
                }
                self.store.insert_user(&user).await?;
                user
            }
        };

        let membership = match self
            .store
            .find_membership(user.user_id, invitation.organization_id)
            .await?
        {
            Some(membership) => membership,
            None => {
                let membership = Membership::new(
                    user.user_id,
                    invitation.organization_id,
                    invitation.role_code.clone(),
                );
                self.store.insert_membership(&membership).await?;
                membership
            }
        };

        self.store
            .mark_invitation_accepted(invitation.invitation_id, Utc::now())
            .await?;

        self.store
            .append_audit_entry(
                &AuditLogEntry::new("invitation.accepted", Some(user.user_id))
                    .with_resource("invitation", invitation.invitation_id.to_string())
                    .with_tenant(invitation.organization_id),
            )
            .await?;

        tracing::info!(user_id = %user.user_id, org_id = %invitation.organization_id, "Invitation accepted");
        Ok((user, membership))
    }

    async fn send(
        &self,
        invitation: &Invitation,
        org_label: &str,
        raw_token: &str,
    ) -> Result<(), IdentityError> {
        let url = format!(
            "{}/invitations/accept?token={}&email={}",
            self.base_url, raw_token, invitation.email
        );
        self.email
            .send_invitation(&invitation.email, org_label, &url)
            .await?;
        Ok(())
    }
}
