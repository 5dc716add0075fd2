//! Strict domain model held by the entity store.
//!
//! These types never see raw server payloads directly; everything arrives
//! through [`crate::normalize`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, NotificationId, PostId, StoryId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Snapshot of a user embedded in posts and notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    /// Name shown in alerts: display name when set, username otherwise.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Refresh preferences the user stores on their profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPreferences {
    pub auto_refresh: bool,
    pub interval_minutes: u32,
}

/// The logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub followers: Vec<UserId>,
    pub following: Vec<UserId>,
    pub preferences: Option<RefreshPreferences>,
}

impl User {
    /// Replace `previous` with `self`, except that a field populated in
    /// `previous` is never regressed to empty. Servers occasionally omit
    /// large fields such as the avatar from partial responses.
    pub fn preserving_populated(mut self, previous: &User) -> User {
        keep_populated(&mut self.display_name, &previous.display_name);
        keep_populated(&mut self.bio, &previous.bio);
        keep_populated(&mut self.avatar_url, &previous.avatar_url);
        keep_populated(&mut self.cover_url, &previous.cover_url);
        if self.preferences.is_none() {
            self.preferences = previous.preferences;
        }
        self
    }
}

fn keep_populated(field: &mut Option<String>, previous: &Option<String>) {
    let empty = field.as_deref().map_or(true, str::is_empty);
    if empty {
        if let Some(prev) = previous.as_ref().filter(|p| !p.is_empty()) {
            *field = Some(prev.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOption {
    pub text: String,
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Poll {
    pub options: Vec<PollOption>,
    /// Voter to chosen option index.
    pub voters: BTreeMap<UserId, usize>,
}

/// A post as held in the store's arena.
///
/// Replies and the repost target are referenced by id, never embedded, so
/// the same post can not exist twice in memory with diverging fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author: UserSummary,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
    /// Reaction kind to count.
    pub reactions: BTreeMap<String, u32>,
    pub poll: Option<Poll>,
    pub replies: Vec<PostId>,
    pub parent_id: Option<PostId>,
    pub repost_of: Option<PostId>,
    pub is_private: bool,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub text: String,
    pub media: Option<MediaRef>,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    /// Participant usernames.
    pub participants: Vec<String>,
    pub encrypted: bool,
    /// Newest first.
    pub messages: Vec<Message>,
    pub last_message_at: DateTime<Utc>,
    /// Username to unread count. Only the server increments these.
    pub unread: BTreeMap<String, u32>,
}

impl Conversation {
    pub fn contains_message(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Insert a message keeping newest-first order. Returns `false` without
    /// touching the conversation when the id is already present.
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.contains_message(&message.id) {
            return false;
        }
        if message.timestamp > self.last_message_at {
            self.last_message_at = message.timestamp;
        }
        let pos = self
            .messages
            .iter()
            .position(|m| m.timestamp <= message.timestamp)
            .unwrap_or(self.messages.len());
        self.messages.insert(pos, message);
        true
    }

    pub fn unread_for(&self, username: &str) -> u32 {
        self.unread.get(username).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Reply,
    Reaction,
    Follow,
    Mention,
    Repost,
    DirectMessage,
    /// A kind this client does not recognise. Stored, rendered generically.
    Unknown(String),
}

impl NotificationKind {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().replace('-', "_").as_str() {
            "reply" | "comment" => Self::Reply,
            "reaction" | "like" => Self::Reaction,
            "follow" => Self::Follow,
            "mention" => Self::Mention,
            "repost" | "echo" => Self::Repost,
            "direct_message" | "message" | "dm" => Self::DirectMessage,
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub actor: UserSummary,
    pub related_post: Option<PostId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoryContent {
    Image { url: String },
    Video { url: String },
    Text { body: String, background: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub user_id: UserId,
    pub username: String,
    pub content: StoryContent,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewers: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: UserId::new("u1"),
            username: "alice".into(),
            display_name: Some("Alice".into()),
            bio: Some("hello".into()),
            avatar_url: Some("https://cdn/avatar.png".into()),
            cover_url: None,
            followers: vec![],
            following: vec![],
            preferences: None,
        }
    }

    fn message(id: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::new(id),
            sender: "bob".into(),
            text: "hi".into(),
            media: None,
            timestamp: at,
            status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_user_merge_keeps_populated_avatar() {
        let previous = user();
        let mut incoming = user();
        incoming.avatar_url = None;
        incoming.bio = Some(String::new());
        incoming.cover_url = Some("https://cdn/cover.png".into());

        let merged = incoming.preserving_populated(&previous);
        assert_eq!(merged.avatar_url.as_deref(), Some("https://cdn/avatar.png"));
        assert_eq!(merged.bio.as_deref(), Some("hello"));
        assert_eq!(merged.cover_url.as_deref(), Some("https://cdn/cover.png"));
    }

    #[test]
    fn test_append_message_dedups_by_id() {
        let now = Utc::now();
        let mut conv = Conversation {
            id: ConversationId::new("alice:bob"),
            participants: vec!["alice".into(), "bob".into()],
            encrypted: false,
            messages: vec![message("m1", now)],
            last_message_at: now,
            unread: BTreeMap::new(),
        };

        assert!(!conv.append_message(message("m1", now)));
        assert_eq!(conv.messages.len(), 1);

        let later = now + Duration::seconds(5);
        assert!(conv.append_message(message("m2", later)));
        assert_eq!(conv.messages[0].id.as_str(), "m2");
        assert_eq!(conv.last_message_at, later);
    }

    #[test]
    fn test_notification_kind_parse() {
        assert_eq!(NotificationKind::parse("reply"), NotificationKind::Reply);
        assert_eq!(
            NotificationKind::parse("direct-message"),
            NotificationKind::DirectMessage
        );
        assert_eq!(
            NotificationKind::parse("birthday"),
            NotificationKind::Unknown("birthday".into())
        );
    }
}
