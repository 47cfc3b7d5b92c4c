//! Credential store - password verification and magic links.

use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;

use crate::models::{MagicLink, MagicLinkPurpose, User};
use crate::services::EmailProvider;
use crate::store::IdentityStore;
use crate::utils::{self, Password, PasswordHashString};

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn IdentityStore>,
    email: Arc<dyn EmailProvider>,
    base_url: String,
    magic_link_hours: i64,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        email: Arc<dyn EmailProvider>,
        base_url: String,
        magic_link_hours: i64,
    ) -> Self {
        Self {
            store,
            email,
            base_url,
            magic_link_hours,
        }
    }

    /// Verify a password against the user's stored hash. Users without
    /// a password hash (magic-link-only accounts) always fail.
    pub fn verify_password(&self, user: &User, password: &str) -> bool {
        match &user.password_hash {
            Some(hash) => utils::verify_password(
                &Password::new(password.to_string()),
                &PasswordHashString::new(hash.clone()),
            )
            .is_ok(),
            None => false,
        }
    }

    /// Issue a magic link and deliver it by email. Returns the stored
    /// record and the raw token (for tests and link construction).
    pub async fn create_magic_link(
        &self,
        email: &str,
        purpose: MagicLinkPurpose,
    ) -> Result<(MagicLink, String), AppError> {
        let raw_token = utils::generate_token();
        let link = MagicLink::new(
            email.to_string(),
            utils::hash_token(&raw_token),
            purpose,
            self.magic_link_hours,
        );
        self.store.insert_magic_link(&link).await?;

        let url = format!(
            "{}/auth/verify?token={}&email={}",
            self.base_url, raw_token, link.email
        );
        self.email.send_magic_link(&link.email, &url).await?;

        tracing::info!(email = %link.email, purpose = %link.purpose_code, "Magic link issued");
        Ok((link, raw_token))
    }

    /// Redeem a magic link. Single-use: a successful verification marks
    /// the link consumed; expired or unknown tokens return `None`
    /// without consuming anything.
    pub async fn verify_magic_link(
        &self,
        email: &str,
        raw_token: &str,
    ) -> Result<Option<MagicLink>, AppError> {
        let Some(link) = self
            .store
            .find_magic_link(email, &utils::hash_token(raw_token))
            .await?
        else {
            return Ok(None);
        };

        if !link.is_valid() {
            return Ok(None);
        }

        // The store-level guard makes redemption race-safe
        let now = Utc::now();
        if !self.store.consume_magic_link(link.magic_link_id, now).await? {
            return Ok(None);
        }

        tracing::info!(email = %link.email, "Magic link redeemed");
        Ok(Some(MagicLink {
            consumed_utc: Some(now),
            ..link
        }))
    }
}
