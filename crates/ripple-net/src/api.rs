//! The REST operations the client consumes.
//!
//! Responses are returned in their raw server shape; turning them into
//! domain types is the caller's job via `ripple_shared::normalize`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ripple_shared::types::{ConversationId, NotificationId, PostId};
use ripple_shared::wire::{
    RawConversation, RawMessage, RawNotification, RawPost, RawStory, RawUser,
};

use crate::error::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_options: Option<Vec<String>>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_refresh: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_minutes: Option<u32>,
}

/// Every server operation the client uses. Implemented over HTTP by
/// [`crate::HttpApi`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ServerApi: Send + Sync {
    // -- Full-state fetches --

    async fn fetch_current_user(&self) -> Result<RawUser, ApiError>;
    async fn fetch_stories(&self) -> Result<Vec<RawStory>, ApiError>;
    async fn fetch_posts(&self) -> Result<Vec<RawPost>, ApiError>;
    async fn fetch_conversations(&self) -> Result<Vec<RawConversation>, ApiError>;
    async fn fetch_notifications(&self) -> Result<Vec<RawNotification>, ApiError>;

    // -- Posts --

    async fn create_post(&self, draft: &PostDraft) -> Result<RawPost, ApiError>;
    async fn reply_to_post(&self, parent: &PostId, draft: &PostDraft)
        -> Result<RawPost, ApiError>;
    /// Repost `target`, optionally with a comment.
    async fn echo_post(&self, target: &PostId, comment: Option<&str>)
        -> Result<RawPost, ApiError>;
    async fn delete_post(&self, id: &PostId) -> Result<(), ApiError>;
    async fn update_post(&self, id: &PostId, update: &PostUpdate) -> Result<RawPost, ApiError>;
    async fn vote_poll(&self, id: &PostId, option: usize) -> Result<RawPost, ApiError>;

    // -- Conversations --

    async fn send_message(
        &self,
        conversation: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<RawMessage, ApiError>;
    async fn mark_conversation_read(&self, conversation: &ConversationId)
        -> Result<(), ApiError>;
    async fn get_or_create_conversation(
        &self,
        username: &str,
        encrypted: bool,
    ) -> Result<RawConversation, ApiError>;

    // -- Users and notifications --

    async fn follow_user(&self, username: &str) -> Result<(), ApiError>;
    async fn unfollow_user(&self, username: &str) -> Result<(), ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<RawUser, ApiError>;
    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), ApiError>;
}
