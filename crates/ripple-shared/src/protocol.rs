use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{EVENT_JOIN, EVENT_NEW_MESSAGE, EVENT_NEW_NOTIFICATION, EVENT_NEW_POST};
use crate::error::{NormalizeError, ProtocolError};
use crate::models::{Message, Notification};
use crate::normalize::{self, PostBatch};
use crate::types::{ConversationId, PostId, UserId};
use crate::wire::{RawMessage, RawNotification, RawPost};

/// A frame on the push socket, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl PushFrame {
    /// Frame asking the server to add this connection to the user's room.
    pub fn join(user_id: &UserId) -> Self {
        Self {
            event: EVENT_JOIN.to_string(),
            data: serde_json::json!({ "room": room_for(user_id) }),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Per-user room name on the push server.
pub fn room_for(user_id: &UserId) -> String {
    format!("user:{user_id}")
}

/// A decoded push event, already normalized to strict types.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewNotification(Notification),
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
    },
    NewPost {
        post_id: PostId,
        /// The post plus any replies or repost target embedded with it.
        batch: PostBatch,
    },
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewNotification(_) => EVENT_NEW_NOTIFICATION,
            Self::NewMessage { .. } => EVENT_NEW_MESSAGE,
            Self::NewPost { .. } => EVENT_NEW_POST,
        }
    }

    /// Decode a named push event. Payloads may be the bare entity or the
    /// entity wrapped under its own key.
    pub fn decode(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            EVENT_NEW_NOTIFICATION => {
                let raw: RawNotification =
                    parse(EVENT_NEW_NOTIFICATION, unwrap_key(data, "notification"))?;
                let notification = normalize::notification(raw).map_err(|source| {
                    ProtocolError::Invalid {
                        event: EVENT_NEW_NOTIFICATION,
                        source,
                    }
                })?;
                Ok(Self::NewNotification(notification))
            }
            EVENT_NEW_MESSAGE => {
                let envelope: RawNewMessage = parse(EVENT_NEW_MESSAGE, data.clone())?;
                let conversation_id = envelope
                    .conversation_id
                    .filter(|id| !id.is_empty())
                    .ok_or(ProtocolError::Invalid {
                        event: EVENT_NEW_MESSAGE,
                        source: NormalizeError::missing("new_message", "conversation_id"),
                    })?;
                let raw = match envelope.message {
                    Some(raw) => raw,
                    None => parse(EVENT_NEW_MESSAGE, data)?,
                };
                let message = normalize::message(raw).map_err(|source| ProtocolError::Invalid {
                    event: EVENT_NEW_MESSAGE,
                    source,
                })?;
                Ok(Self::NewMessage {
                    conversation_id: ConversationId::new(conversation_id),
                    message,
                })
            }
            EVENT_NEW_POST => {
                let raw: RawPost = parse(EVENT_NEW_POST, unwrap_key(data, "post"))?;
                let (post_id, batch) = normalize::post(raw).map_err(|source| {
                    ProtocolError::Invalid {
                        event: EVENT_NEW_POST,
                        source,
                    }
                })?;
                Ok(Self::NewPost { post_id, batch })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNewMessage {
    #[serde(default, alias = "conversationId", alias = "chatId")]
    conversation_id: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
}

fn unwrap_key(data: Value, key: &str) -> Value {
    match data {
        Value::Object(mut map) if map.get(key).map_or(false, Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn parse<T: for<'de> Deserialize<'de>>(event: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Malformed { event, source })
}
