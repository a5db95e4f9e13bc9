//! Lock records and their expiry arithmetic.

use crate::identity::FileId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A WOPI lock held on one file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The locked file.
    pub file_id: FileId,

    /// Opaque lock value chosen by the client.
    pub lock: String,

    /// Host process that wrote the record (e.g., `user@HOST`).
    pub owner: String,

    /// When the lock with this value was first taken.
    pub created_at: DateTime<Utc>,

    /// When the lock lapses unless refreshed.
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// A record taken now, lasting `ttl`.
    pub fn new(file_id: FileId, lock: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            file_id,
            lock: lock.to_string(),
            owner: get_owner_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// The record after a successful replace with `lock`.
    ///
    /// Expiry restarts. Creation time is kept when the value is unchanged.
    pub fn renewed(&self, lock: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            file_id: self.file_id.clone(),
            lock: lock.to_string(),
            owner: get_owner_string(),
            created_at: if lock == self.lock {
                self.created_at
            } else {
                now
            },
            expires_at: now + ttl,
        }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    /// Age of the lock as a human-readable string.
    pub fn age_string(&self) -> String {
        format_duration(Utc::now().signed_duration_since(self.created_at))
    }

    /// Time left before expiry, or `expired`.
    pub fn remaining_string(&self) -> String {
        let left = self.expires_at.signed_duration_since(Utc::now());
        if left <= Duration::zero() {
            "expired".to_string()
        } else {
            format_duration(left)
        }
    }
}

fn format_duration(d: Duration) -> String {
    let minutes = d.num_minutes();
    let hours = d.num_hours();
    let days = d.num_days();

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", d.num_seconds().max(0))
    }
}

/// Owner string recorded in lock records.
pub fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
