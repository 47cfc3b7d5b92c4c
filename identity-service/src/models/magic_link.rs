//! Magic link model - single-use, time-limited login tokens delivered
//! out of band.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Magic link purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagicLinkPurpose {
    Login,
    Signup,
}

impl MagicLinkPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagicLinkPurpose::Login => "login",
            MagicLinkPurpose::Signup => "signup",
        }
    }
}

/// Magic link entity. The raw token travels in the email URL; only its
/// hash is stored.
#[derive(Debug, Clone, FromRow)]
pub struct MagicLink {
    pub magic_link_id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub purpose_code: String,
    pub expiry_utc: DateTime<Utc>,
    pub consumed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl MagicLink {
    /// Create a new magic link with the given lifetime.
    pub fn new(
        email: String,
        token_hash: String,
        purpose: MagicLinkPurpose,
        lifetime_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            magic_link_id: Uuid::new_v4(),
            email: crate::utils::normalize_email(&email),
            token_hash,
            purpose_code: purpose.as_str().to_string(),
            expiry_utc: now + Duration::hours(lifetime_hours),
            consumed_utc: None,
            created_utc: now,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    /// Check the link can still be redeemed.
    pub fn is_valid(&self) -> bool {
        !self.is_consumed() && !self.is_expired()
    }
}
