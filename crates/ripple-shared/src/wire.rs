//! Payload shapes as the server actually sends them.
//!
//! The server is inconsistent: field names arrive in snake_case or
//! camelCase, users arrive as bare usernames or embedded objects, and
//! timestamps arrive as RFC 3339 strings or epoch milliseconds. Every
//! variant is accepted here and nothing outside [`crate::normalize`] reads
//! these types.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An id as the server sends it. Older endpoints emit bare numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(n) => n.to_string(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(de)?.map(RawId::into_string))
}

/// `null` reads as `false`.
fn lenient_flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(de)?.unwrap_or(false))
}

/// A timestamp in any of the encodings the server uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// A user reference: either a bare username or an embedded user object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawUserRef {
    Name(String),
    Object(RawUser),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawUser {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        alias = "_id",
        alias = "userId",
        alias = "user_id"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "displayName", alias = "name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, alias = "avatarUrl", alias = "avatar")]
    pub avatar_url: Option<String>,
    #[serde(default, alias = "coverUrl", alias = "cover")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub followers: Vec<RawUserRef>,
    #[serde(default)]
    pub following: Vec<RawUserRef>,
    #[serde(default, alias = "autoRefresh")]
    pub auto_refresh: Option<bool>,
    #[serde(
        default,
        alias = "refreshInterval",
        alias = "refresh_interval",
        alias = "refreshIntervalMinutes"
    )]
    pub refresh_interval_minutes: Option<u32>,
}

/// Media attachment: a bare URL or an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawMedia {
    Url(String),
    Object {
        url: String,
        #[serde(default, alias = "mimeType", alias = "mime_type", alias = "type")]
        mime: Option<String>,
    },
}

/// Reaction tallies arrive either as counts or as lists of reacting users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawReaction {
    Count(u32),
    Users(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPollOption {
    #[serde(alias = "label", alias = "option")]
    pub text: String,
    #[serde(default, alias = "count", alias = "voteCount")]
    pub votes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawPoll {
    #[serde(default)]
    pub options: Vec<RawPollOption>,
    #[serde(default, alias = "userVotes", alias = "user_votes")]
    pub voters: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    #[serde(default, deserialize_with = "lenient_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "user")]
    pub author: Option<RawUserRef>,
    #[serde(default, alias = "text")]
    pub content: Option<String>,
    #[serde(default, alias = "images")]
    pub media: Vec<RawMedia>,
    #[serde(default, alias = "createdAt", alias = "timestamp")]
    pub created_at: Option<RawTimestamp>,
    #[serde(default)]
    pub reactions: BTreeMap<String, RawReaction>,
    #[serde(default)]
    pub poll: Option<RawPoll>,
    #[serde(default, alias = "comments")]
    pub replies: Vec<RawPost>,
    #[serde(default, deserialize_with = "lenient_id", alias = "parentId")]
    pub parent_id: Option<String>,
    #[serde(
        default,
        alias = "repostOf",
        alias = "echo_of",
        alias = "echoOf",
        alias = "original"
    )]
    pub repost_of: Option<Box<RawPost>>,
    #[serde(default, deserialize_with = "lenient_flag", alias = "isPrivate", alias = "private")]
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "from")]
    pub sender: Option<RawUserRef>,
    #[serde(default, alias = "content")]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<RawMedia>,
    #[serde(default, alias = "createdAt", alias = "created_at")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawConversation {
    #[serde(default, deserialize_with = "lenient_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub participants: Vec<RawUserRef>,
    #[serde(
        default,
        deserialize_with = "lenient_flag",
        alias = "isEncrypted",
        alias = "is_encrypted"
    )]
    pub encrypted: bool,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(
        default,
        alias = "lastMessageAt",
        alias = "updatedAt",
        alias = "updated_at"
    )]
    pub last_message_at: Option<RawTimestamp>,
    #[serde(default, alias = "unreadCount", alias = "unread_count")]
    pub unread: BTreeMap<String, u32>,
}

/// Related post on a notification: a bare id or an embedded post stub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawPostRef {
    Id(RawId),
    Object {
        #[serde(alias = "_id")]
        id: RawId,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawNotification {
    #[serde(default, deserialize_with = "lenient_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default, alias = "from", alias = "sender")]
    pub actor: Option<RawUserRef>,
    #[serde(default, alias = "postId", alias = "post_id", alias = "relatedPost")]
    pub post: Option<RawPostRef>,
    #[serde(default, deserialize_with = "lenient_flag", alias = "isRead", alias = "is_read")]
    pub read: bool,
    #[serde(default, alias = "createdAt", alias = "timestamp")]
    pub created_at: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawStory {
    #[serde(default, deserialize_with = "lenient_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "author")]
    pub user: Option<RawUserRef>,
    #[serde(default, deserialize_with = "lenient_id", alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "type", alias = "storyType", alias = "story_type")]
    pub story_type: Option<String>,
    #[serde(default, alias = "text")]
    pub content: Option<String>,
    #[serde(default, alias = "mediaUrl", alias = "url")]
    pub media_url: Option<String>,
    #[serde(default, alias = "backgroundColor", alias = "background_color")]
    pub background: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<RawTimestamp>,
    #[serde(default, alias = "expiresAt")]
    pub expires_at: Option<RawTimestamp>,
    #[serde(default)]
    pub viewers: Vec<String>,
}

/// Collections arrive bare or wrapped in an envelope object. Items stay
/// untyped until [`RawCollection::decode_each`] so one malformed entity
/// cannot fail the whole list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawCollection {
    List(Vec<Value>),
    Envelope {
        #[serde(
            alias = "posts",
            alias = "conversations",
            alias = "notifications",
            alias = "stories",
            alias = "items"
        )]
        data: Vec<Value>,
    },
}

impl RawCollection {
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::List(items) => items,
            Self::Envelope { data } => data,
        }
    }

    /// Decode every item on its own, returning the good ones and the
    /// errors for the rest.
    pub fn decode_each<T: DeserializeOwned>(self) -> (Vec<T>, Vec<serde_json::Error>) {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        for value in self.into_vec() {
            match serde_json::from_value(value) {
                Ok(item) => items.push(item),
                Err(e) => errors.push(e),
            }
        }
        (items, errors)
    }
}
