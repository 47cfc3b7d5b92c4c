//! User model - platform-wide user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Invited,
    Disabled,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Invited => "invited",
            UserState::Disabled => "disabled",
        }
    }
}

/// User entity. Never hard-deleted; disabling sets the state code
/// and revokes all sessions.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub default_role_code: String,
    pub user_state_code: String,
    pub email_verified: bool,
    pub password_hash: Option<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new active user. Email is stored normalized.
    pub fn new(email: String, display_name: Option<String>, default_role_code: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: crate::utils::normalize_email(&email),
            display_name,
            default_role_code,
            user_state_code: UserState::Active.as_str().to_string(),
            email_verified: false,
            password_hash: None,
            last_login_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a user in the invited state (pending invitation acceptance).
    pub fn new_invited(email: String, default_role_code: String) -> Self {
        let mut user = Self::new(email, None, default_role_code);
        user.user_state_code = UserState::Invited.as_str().to_string();
        user
    }

    /// Check if user is active.
    pub fn is_active(&self) -> bool {
        self.user_state_code == UserState::Active.as_str()
    }

    /// Check if user is disabled.
    pub fn is_disabled(&self) -> bool {
        self.user_state_code == UserState::Disabled.as_str()
    }

    /// Convert to sanitized response (no credential fields).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub default_role_code: String,
    pub user_state_code: String,
    pub email_verified: bool,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            display_name: u.display_name,
            default_role_code: u.default_role_code,
            user_state_code: u.user_state_code,
            email_verified: u.email_verified,
            last_login_utc: u.last_login_utc,
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new("  Jo@Example.COM ".to_string(), None, "member".to_string());
        assert_eq!(user.email, "jo@example.com");
        assert!(user.is_active());
        assert!(user.password_hash.is_none());
    }

    #[test]
    fn test_sanitized_omits_password_hash() {
        let mut user = User::new("a@b.com".to_string(), None, "member".to_string());
        user.password_hash = Some("$argon2id$...".to_string());
        let json = serde_json::to_value(user.sanitized()).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
