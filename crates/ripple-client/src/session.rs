//! The authenticated session boundary.
//!
//! A [`Session`] is created at login and dropped at logout. It owns the
//! seen-notification set, so nothing about delivery outlives the session.

use chrono::{DateTime, Utc};

use ripple_shared::types::{SessionId, UserId};

use crate::notify::SeenNotifications;

/// Who is logging in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub username: String,
    /// Bearer token for the push socket.
    pub token: String,
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub credentials: Credentials,
    pub started_at: DateTime<Utc>,
    pub seen: SeenNotifications,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            id: SessionId::new(),
            credentials,
            started_at: Utc::now(),
            seen: SeenNotifications::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn user_id(&self) -> &UserId {
        &self.credentials.user_id
    }

    /// Whether `name` (a username or user id) is the logged-in user.
    pub fn is_me(&self, name: &str) -> bool {
        name == self.credentials.username || name == self.credentials.user_id.as_str()
    }
}

/// What handle calls need to know about the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub credentials: Credentials,
}

impl SessionInfo {
    pub fn username(&self) -> &str {
        &self.credentials.username
    }
}
