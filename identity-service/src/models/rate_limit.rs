//! Rate limit window and IP allowlist models for the elevated access layer.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Fixed-window rate limit counter keyed by (user, bucket).
///
/// Bursts at window boundaries are a known characteristic of the
/// fixed-window algorithm.
#[derive(Debug, Clone, FromRow)]
pub struct RateLimitWindow {
    pub user_id: Uuid,
    pub bucket: String,
    pub window_start_utc: DateTime<Utc>,
    pub count: i64,
}

impl RateLimitWindow {
    /// Open a fresh window with one request counted.
    pub fn new(user_id: Uuid, bucket: String) -> Self {
        Self {
            user_id,
            bucket,
            window_start_utc: Utc::now(),
            count: 1,
        }
    }

    /// Check whether the window has lapsed.
    pub fn is_expired(&self, window_seconds: i64, now: DateTime<Utc>) -> bool {
        self.window_start_utc + chrono::Duration::seconds(window_seconds) <= now
    }
}

/// IP allowlist entry for super admin access.
///
/// An empty allowlist table passes all IPs (fail-open); once any entry
/// exists, only listed IPs pass.
#[derive(Debug, Clone, FromRow)]
pub struct IpAllowlistEntry {
    pub entry_id: Uuid,
    pub ip: String,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl IpAllowlistEntry {
    pub fn new(ip: String, note: Option<String>, created_by: Option<Uuid>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            ip,
            note,
            created_by,
            created_utc: Utc::now(),
        }
    }
}
