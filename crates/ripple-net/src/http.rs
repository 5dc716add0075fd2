//! [`ServerApi`] over HTTP with a bounded per-request timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use ripple_shared::types::{ConversationId, NotificationId, PostId};
use ripple_shared::wire::{
    RawCollection, RawConversation, RawMessage, RawNotification, RawPost, RawStory, RawUser,
};

use crate::api::{MessageDraft, PostDraft, PostUpdate, ProfileUpdate, ServerApi};
use crate::error::ApiError;

pub struct HttpApi {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpApi {
    /// Build a client for the server at `base_url`. Every request, connect
    /// included, fails with [`ApiError::Timeout`] after `timeout`.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty().push("api").extend(segments);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, url = %url, "API request");

        let mut request = self.http.request(method, url.clone()).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let value = parse_body(&text);

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "Session token rejected");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: error_descriptor(&value).unwrap_or_else(|| status.to_string()),
            });
        }
        if let Some(message) = error_descriptor(&value) {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(value)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let value = self.send(Method::GET, segments, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a collection. Items that fail to decode are dropped with a
    /// warning; the rest still come back.
    async fn get_list<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Vec<T>, ApiError> {
        let collection: RawCollection = self.get(segments).await?;
        Ok(decode_items(segments, collection))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Value,
    ) -> Result<T, ApiError> {
        let value = self.send(method, segments, Some(body)).await?;
        Ok(serde_json::from_value(unwrap_entity(value))?)
    }

    async fn call_unit(&self, method: Method, segments: &[&str]) -> Result<(), ApiError> {
        self.send(method, segments, None).await.map(|_| ())
    }
}

fn decode_items<T: DeserializeOwned>(segments: &[&str], collection: RawCollection) -> Vec<T> {
    let (items, errors) = collection.decode_each();
    if !errors.is_empty() {
        let collection = segments.join("/");
        for e in &errors {
            debug!(collection = %collection, error = %e, "Undecodable item");
        }
        warn!(
            collection = %collection,
            kept = items.len(),
            skipped = errors.len(),
            "Skipped malformed items in fetched collection"
        );
    }
    items
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Extract the message from an `{"error": ...}` descriptor, which the
/// server sometimes sends with a success status.
fn error_descriptor(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    if obj.contains_key("id") {
        return None;
    }
    let failed = obj.get("success").and_then(Value::as_bool) == Some(false);
    match obj.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| Some("unknown error".to_string())),
        Some(Value::Null) | None if failed => obj
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| Some("request failed".to_string())),
        _ => None,
    }
}

/// Mutation responses wrap the entity as `{"post": {...}}` on some routes.
fn unwrap_entity(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            let key = map.keys().next().cloned().unwrap_or_default();
            let inner_is_object = map.get(&key).map_or(false, Value::is_object);
            if inner_is_object && ["post", "message", "conversation", "user", "data"].contains(&key.as_str()) {
                map.remove(&key).unwrap_or(Value::Null)
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[async_trait]
impl ServerApi for HttpApi {
    async fn fetch_current_user(&self) -> Result<RawUser, ApiError> {
        let value = self.send(Method::GET, &["users", "me"], None).await?;
        Ok(serde_json::from_value(unwrap_entity(value))?)
    }

    async fn fetch_stories(&self) -> Result<Vec<RawStory>, ApiError> {
        self.get_list(&["stories"]).await
    }

    async fn fetch_posts(&self) -> Result<Vec<RawPost>, ApiError> {
        self.get_list(&["posts"]).await
    }

    async fn fetch_conversations(&self) -> Result<Vec<RawConversation>, ApiError> {
        self.get_list(&["conversations"]).await
    }

    async fn fetch_notifications(&self) -> Result<Vec<RawNotification>, ApiError> {
        self.get_list(&["notifications"]).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<RawPost, ApiError> {
        self.call(Method::POST, &["posts"], serde_json::to_value(draft)?)
            .await
    }

    async fn reply_to_post(&self, parent: &PostId, draft: &PostDraft) -> Result<RawPost, ApiError> {
        self.call(
            Method::POST,
            &["posts", parent.as_str(), "replies"],
            serde_json::to_value(draft)?,
        )
        .await
    }

    async fn echo_post(&self, target: &PostId, comment: Option<&str>) -> Result<RawPost, ApiError> {
        self.call(
            Method::POST,
            &["posts", target.as_str(), "echo"],
            json!({ "comment": comment }),
        )
        .await
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), ApiError> {
        self.call_unit(Method::DELETE, &["posts", id.as_str()]).await
    }

    async fn update_post(&self, id: &PostId, update: &PostUpdate) -> Result<RawPost, ApiError> {
        self.call(
            Method::PUT,
            &["posts", id.as_str()],
            serde_json::to_value(update)?,
        )
        .await
    }

    async fn vote_poll(&self, id: &PostId, option: usize) -> Result<RawPost, ApiError> {
        self.call(
            Method::POST,
            &["posts", id.as_str(), "vote"],
            json!({ "option": option }),
        )
        .await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<RawMessage, ApiError> {
        self.call(
            Method::POST,
            &["conversations", conversation.as_str(), "messages"],
            serde_json::to_value(draft)?,
        )
        .await
    }

    async fn mark_conversation_read(&self, conversation: &ConversationId) -> Result<(), ApiError> {
        self.call_unit(
            Method::POST,
            &["conversations", conversation.as_str(), "read"],
        )
        .await
    }

    async fn get_or_create_conversation(
        &self,
        username: &str,
        encrypted: bool,
    ) -> Result<RawConversation, ApiError> {
        self.call(
            Method::POST,
            &["conversations"],
            json!({ "participant": username, "encrypted": encrypted }),
        )
        .await
    }

    async fn follow_user(&self, username: &str) -> Result<(), ApiError> {
        self.call_unit(Method::POST, &["users", username, "follow"])
            .await
    }

    async fn unfollow_user(&self, username: &str) -> Result<(), ApiError> {
        self.call_unit(Method::DELETE, &["users", username, "follow"])
            .await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<RawUser, ApiError> {
        self.call(
            Method::PUT,
            &["users", "me"],
            serde_json::to_value(update)?,
        )
        .await
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        self.call_unit(Method::POST, &["notifications", id.as_str(), "read"])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(base, "token", Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let api = api("http://localhost:8080");
        let url = api.endpoint(&["posts", "p1", "vote"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/posts/p1/vote");

        let api = self::api("http://localhost:8080/social/");
        let url = api.endpoint(&["users", "me"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/social/api/users/me");
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let api = api("http://localhost:8080");
        let url = api.endpoint(&["conversations", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/conversations/a%20b%2Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpApi::new("not a url", "t", Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_malformed_item_does_not_drop_collection() {
        let body = json!({ "notifications": [
            { "id": "n1", "type": "follow", "actor": "bob", "read": false },
            { "id": "n2", "type": "reply", "actor": 42 },
            { "id": 3, "type": "mention", "actor": "dave", "read": null }
        ]});
        let collection: RawCollection = serde_json::from_value(body).unwrap();
        let items: Vec<RawNotification> = decode_items(&["notifications"], collection);

        let ids: Vec<_> = items.iter().filter_map(|n| n.id.as_deref()).collect();
        assert_eq!(ids, vec!["n1", "3"]);
        assert!(!items[1].read);
    }

    #[test]
    fn test_error_descriptor() {
        assert_eq!(
            error_descriptor(&json!({ "error": "Post not found" })),
            Some("Post not found".into())
        );
        assert_eq!(
            error_descriptor(&json!({ "success": false, "message": "nope" })),
            Some("nope".into())
        );
        assert_eq!(error_descriptor(&json!({ "id": "p1", "error": null })), None);
        assert_eq!(error_descriptor(&json!([1, 2])), None);
    }

    #[test]
    fn test_unwrap_entity() {
        let wrapped = json!({ "post": { "id": "p1" } });
        assert_eq!(unwrap_entity(wrapped), json!({ "id": "p1" }));
        let bare = json!({ "id": "p1", "content": "x" });
        assert_eq!(unwrap_entity(bare.clone()), bare);
    }
}
