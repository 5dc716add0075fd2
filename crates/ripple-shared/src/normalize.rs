//! The one seam between server payloads and the strict domain model.
//!
//! Every "tolerate variants" rule lives in this module. Callers get strict
//! types or a [`NormalizeError`] for the single offending entity; a bad
//! entity never poisons the rest of its collection.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::constants::MAX_POST_DEPTH;
use crate::error::NormalizeError;
use crate::models::{
    Conversation, DeliveryStatus, MediaRef, Message, Notification, NotificationKind, Poll,
    PollOption, Post, RefreshPreferences, Story, StoryContent, User, UserSummary,
};
use crate::types::{ConversationId, MessageId, NotificationId, PostId, StoryId, UserId};
use crate::wire::{
    RawConversation, RawMedia, RawMessage, RawNotification, RawPoll, RawPost, RawPostRef,
    RawReaction, RawStory, RawTimestamp, RawUser, RawUserRef,
};

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Convert any server timestamp encoding to a concrete UTC time.
pub fn timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>, NormalizeError> {
    match raw {
        RawTimestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms)
            .ok_or_else(|| NormalizeError::InvalidTimestamp(ms.to_string())),
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
                return Ok(naive.and_utc());
            }
            if let Ok(ms) = text.parse::<i64>() {
                return timestamp(&RawTimestamp::Millis(ms));
            }
            Err(NormalizeError::InvalidTimestamp(text.to_string()))
        }
    }
}

/// Missing timestamps map to the epoch so that normalizing the same payload
/// twice yields identical values.
fn timestamp_or_epoch(raw: Option<&RawTimestamp>) -> Result<DateTime<Utc>, NormalizeError> {
    match raw {
        Some(raw) => timestamp(raw),
        None => Ok(DateTime::<Utc>::default()),
    }
}

fn media(raw: &RawMedia) -> MediaRef {
    match raw {
        RawMedia::Url(url) => MediaRef {
            url: url.clone(),
            mime: None,
        },
        RawMedia::Object { url, mime } => MediaRef {
            url: url.clone(),
            mime: mime.clone(),
        },
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Plain username from either participant shape.
pub fn username(raw: &RawUserRef) -> Option<String> {
    match raw {
        RawUserRef::Name(name) => non_empty(Some(name.clone())),
        RawUserRef::Object(user) => non_empty(user.username.clone()),
    }
}

pub fn user_summary(raw: &RawUserRef) -> Result<UserSummary, NormalizeError> {
    match raw {
        RawUserRef::Name(name) if !name.is_empty() => Ok(UserSummary {
            id: UserId::new(name.clone()),
            username: name.clone(),
            display_name: None,
            avatar_url: None,
        }),
        RawUserRef::Name(_) => Err(NormalizeError::missing("user", "username")),
        RawUserRef::Object(user) => {
            let username = non_empty(user.username.clone())
                .ok_or_else(|| NormalizeError::missing("user", "username"))?;
            let id = non_empty(user.id.clone()).unwrap_or_else(|| username.clone());
            Ok(UserSummary {
                id: UserId::new(id),
                username,
                display_name: non_empty(user.display_name.clone()),
                avatar_url: non_empty(user.avatar_url.clone()),
            })
        }
    }
}

fn user_ids(refs: &[RawUserRef]) -> Vec<UserId> {
    refs.iter()
        .filter_map(|r| match r {
            RawUserRef::Name(name) => non_empty(Some(name.clone())).map(UserId::new),
            RawUserRef::Object(u) => non_empty(u.id.clone())
                .or_else(|| non_empty(u.username.clone()))
                .map(UserId::new),
        })
        .collect()
}

pub fn user(raw: RawUser) -> Result<User, NormalizeError> {
    let username =
        non_empty(raw.username).ok_or_else(|| NormalizeError::missing("user", "username"))?;
    let id = non_empty(raw.id).unwrap_or_else(|| username.clone());
    let preferences = match (raw.auto_refresh, raw.refresh_interval_minutes) {
        (None, None) => None,
        (auto, minutes) => Some(RefreshPreferences {
            auto_refresh: auto.unwrap_or(true),
            interval_minutes: minutes.unwrap_or(crate::constants::DEFAULT_REFRESH_MINUTES),
        }),
    };
    Ok(User {
        id: UserId::new(id),
        username,
        display_name: non_empty(raw.display_name),
        bio: non_empty(raw.bio),
        avatar_url: non_empty(raw.avatar_url),
        cover_url: non_empty(raw.cover_url),
        followers: user_ids(&raw.followers),
        following: user_ids(&raw.following),
        preferences,
    })
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// A fetched post list flattened into an arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostBatch {
    /// Top-level feed order, deduplicated, first occurrence wins.
    pub order: Vec<PostId>,
    /// Every post reachable from the feed, keyed by id.
    pub posts: HashMap<PostId, Post>,
    /// Entities dropped because they could not be normalized.
    pub skipped: usize,
}

/// Flatten a fetched feed into an arena. Replies and repost targets become
/// id references; a repost target that is itself a repost loses its nested
/// target, since reposting a repost is not allowed.
pub fn posts(raw: Vec<RawPost>) -> PostBatch {
    let mut batch = PostBatch::default();
    for item in raw {
        match flatten_post(item, None, 0, true, &mut batch) {
            Ok(id) => {
                if !batch.order.contains(&id) {
                    batch.order.push(id);
                }
            }
            Err(_) => batch.skipped += 1,
        }
    }
    batch
}

/// Normalize a single post, e.g. from a push event. Nested entities are
/// returned alongside the root.
pub fn post(raw: RawPost) -> Result<(PostId, PostBatch), NormalizeError> {
    let mut batch = PostBatch::default();
    let id = flatten_post(raw, None, 0, true, &mut batch)?;
    batch.order.push(id.clone());
    Ok((id, batch))
}

fn flatten_post(
    raw: RawPost,
    parent: Option<&PostId>,
    depth: usize,
    allow_repost: bool,
    batch: &mut PostBatch,
) -> Result<PostId, NormalizeError> {
    if depth > MAX_POST_DEPTH {
        return Err(NormalizeError::TooDeep(MAX_POST_DEPTH));
    }
    let id = non_empty(raw.id)
        .map(PostId::new)
        .ok_or_else(|| NormalizeError::missing("post", "id"))?;
    if batch.posts.contains_key(&id) {
        return Ok(id);
    }
    let author = raw
        .author
        .as_ref()
        .ok_or_else(|| NormalizeError::missing("post", "author"))
        .and_then(user_summary)?;
    let created_at = timestamp_or_epoch(raw.created_at.as_ref())?;

    // Claim the id before descending so a cyclic payload terminates.
    batch.posts.insert(
        id.clone(),
        Post {
            id: id.clone(),
            author,
            content: raw.content.unwrap_or_default(),
            media: raw.media.iter().map(media).collect(),
            created_at,
            reactions: reactions(raw.reactions),
            poll: raw.poll.map(poll),
            replies: Vec::new(),
            parent_id: raw
                .parent_id
                .and_then(|p| non_empty(Some(p)))
                .map(PostId::new)
                .or_else(|| parent.cloned()),
            repost_of: None,
            is_private: raw.is_private,
        },
    );

    let mut replies = Vec::with_capacity(raw.replies.len());
    for reply in raw.replies {
        match flatten_post(reply, Some(&id), depth + 1, true, batch) {
            Ok(reply_id) => replies.push(reply_id),
            Err(_) => batch.skipped += 1,
        }
    }

    let repost_of = match raw.repost_of {
        Some(target) if allow_repost => {
            match flatten_post(*target, None, depth + 1, false, batch) {
                Ok(target_id) => Some(target_id),
                Err(_) => {
                    batch.skipped += 1;
                    None
                }
            }
        }
        Some(_) => {
            batch.skipped += 1;
            None
        }
        None => None,
    };

    if let Some(entry) = batch.posts.get_mut(&id) {
        entry.replies = replies;
        entry.repost_of = repost_of;
    }
    Ok(id)
}

fn reactions(raw: BTreeMap<String, RawReaction>) -> BTreeMap<String, u32> {
    raw.into_iter()
        .map(|(kind, value)| {
            let count = match value {
                RawReaction::Count(n) => n,
                RawReaction::Users(users) => users.len() as u32,
            };
            (kind, count)
        })
        .collect()
}

fn poll(raw: RawPoll) -> Poll {
    Poll {
        options: raw
            .options
            .into_iter()
            .map(|o| PollOption {
                text: o.text,
                votes: o.votes,
            })
            .collect(),
        voters: raw
            .voters
            .into_iter()
            .map(|(voter, choice)| (UserId::new(voter), choice))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

pub fn message(raw: RawMessage) -> Result<Message, NormalizeError> {
    let id = non_empty(raw.id).ok_or_else(|| NormalizeError::missing("message", "id"))?;
    let sender = raw
        .sender
        .as_ref()
        .and_then(username)
        .ok_or_else(|| NormalizeError::missing("message", "sender"))?;
    let status = match raw.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("delivered") => DeliveryStatus::Delivered,
        Some("read") | Some("seen") => DeliveryStatus::Read,
        _ => DeliveryStatus::Sent,
    };
    Ok(Message {
        id: MessageId::new(id),
        sender,
        text: raw.text.unwrap_or_default(),
        media: raw.media.as_ref().map(media),
        timestamp: timestamp_or_epoch(raw.timestamp.as_ref())?,
        status,
    })
}

pub fn conversation(raw: RawConversation) -> Result<Conversation, NormalizeError> {
    let id = non_empty(raw.id).ok_or_else(|| NormalizeError::missing("conversation", "id"))?;
    let participants: Vec<String> = raw.participants.iter().filter_map(username).collect();

    let mut messages: Vec<Message> = Vec::with_capacity(raw.messages.len());
    for item in raw.messages {
        // A single bad message does not drop the conversation.
        if let Ok(m) = message(item) {
            if !messages.iter().any(|existing| existing.id == m.id) {
                messages.push(m);
            }
        }
    }
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let last_message_at = match raw.last_message_at.as_ref() {
        Some(ts) => timestamp(ts)?,
        None => messages
            .first()
            .map(|m| m.timestamp)
            .unwrap_or_default(),
    };

    Ok(Conversation {
        id: ConversationId::new(id),
        participants,
        encrypted: raw.encrypted,
        messages,
        last_message_at,
        unread: raw.unread,
    })
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub fn notification(raw: RawNotification) -> Result<Notification, NormalizeError> {
    let id = non_empty(raw.id).ok_or_else(|| NormalizeError::missing("notification", "id"))?;
    let actor = raw
        .actor
        .as_ref()
        .ok_or_else(|| NormalizeError::missing("notification", "actor"))
        .and_then(user_summary)?;
    let kind = raw
        .kind
        .as_deref()
        .map(NotificationKind::parse)
        .unwrap_or_else(|| NotificationKind::Unknown(String::new()));
    let related_post = raw.post.map(|p| match p {
        RawPostRef::Id(id) | RawPostRef::Object { id } => PostId::new(id.into_string()),
    });
    Ok(Notification {
        id: NotificationId::new(id),
        kind,
        actor,
        related_post,
        read: raw.read,
        created_at: timestamp_or_epoch(raw.created_at.as_ref())?,
    })
}

// ---------------------------------------------------------------------------
// Stories
// ---------------------------------------------------------------------------

pub fn story(raw: RawStory) -> Result<Story, NormalizeError> {
    let id = non_empty(raw.id).ok_or_else(|| NormalizeError::missing("story", "id"))?;
    let owner = raw.user.as_ref().and_then(|u| user_summary(u).ok());
    let username = non_empty(raw.username)
        .or_else(|| owner.as_ref().map(|o| o.username.clone()))
        .ok_or_else(|| NormalizeError::missing("story", "username"))?;
    let user_id = non_empty(raw.user_id)
        .map(UserId::new)
        .or_else(|| owner.map(|o| o.id))
        .unwrap_or_else(|| UserId::new(username.clone()));

    let content = match raw.story_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("image") => StoryContent::Image {
            url: non_empty(raw.media_url)
                .ok_or_else(|| NormalizeError::missing("story", "media_url"))?,
        },
        Some("video") => StoryContent::Video {
            url: non_empty(raw.media_url)
                .ok_or_else(|| NormalizeError::missing("story", "media_url"))?,
        },
        _ => match non_empty(raw.media_url) {
            Some(url) if raw.content.is_none() => StoryContent::Image { url },
            _ => StoryContent::Text {
                body: raw.content.unwrap_or_default(),
                background: non_empty(raw.background),
            },
        },
    };

    let created_at = timestamp_or_epoch(raw.created_at.as_ref())?;
    let expires_at = match raw.expires_at.as_ref() {
        Some(ts) => timestamp(ts)?,
        None => created_at + chrono::Duration::hours(24),
    };

    Ok(Story {
        id: StoryId::new(id),
        user_id,
        username,
        content,
        created_at,
        expires_at,
        viewers: raw.viewers.into_iter().map(UserId::new).collect(),
    })
}
