//! Records persisted in the server database.
//!
//! Messages are stored as the shared [`Message`] type directly; users carry
//! their password hash here and are converted to [`UserProfile`] before
//! leaving the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use murmur_shared::types::{Message, UserId, UserProfile};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Server-assigned identifier.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email, unique across users.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Stable URL of the avatar image, if one was uploaded.
    pub profile_pic: Option<String>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            profile_pic: self.profile_pic.clone(),
            created_at: self.created_at,
        }
    }
}

/// Partial update applied by [`crate::Database::update_user_profile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub profile_pic: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.profile_pic.is_none()
    }
}
