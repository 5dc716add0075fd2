//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use ripple_net::{
    ApiError, MessageDraft, PostDraft, PostUpdate, ProfileUpdate, PushCommand, PushError,
    PushNotification, ServerApi,
};
use ripple_shared::models::{Notification, NotificationKind, Post, UserSummary};
use ripple_shared::types::{ConversationId, NotificationId, PostId, UserId};
use ripple_shared::wire::{
    RawCollection, RawConversation, RawMessage, RawNotification, RawPost, RawStory, RawUser,
};

use crate::commands::settings::AppSettings;
use crate::engine::{spawn_client, EngineOptions};
use crate::handle::ClientHandle;
use crate::notify::{Alert, Notifier, Permission, Sound};
use crate::push_bridge::{PushChannel, PushConnector};
use crate::session::Credentials;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn credentials() -> Credentials {
    Credentials {
        user_id: UserId::new("u1"),
        username: "alice".into(),
        token: "test-token".into(),
    }
}

pub(crate) fn notification(id: &str, kind: &str, read: bool) -> Notification {
    Notification {
        id: NotificationId::new(id),
        kind: NotificationKind::parse(kind),
        actor: summary("bob"),
        related_post: None,
        read,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
    }
}

pub(crate) fn post(id: &str, author: &str) -> Post {
    Post {
        id: PostId::new(id),
        author: summary(author),
        content: String::new(),
        media: Vec::new(),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        reactions: Default::default(),
        poll: None,
        replies: Vec::new(),
        parent_id: None,
        repost_of: None,
        is_private: false,
    }
}

fn summary(username: &str) -> UserSummary {
    UserSummary {
        id: UserId::new(username),
        username: username.into(),
        display_name: None,
        avatar_url: None,
    }
}

/// Poll `check` until it holds. Panics after two seconds.
pub(crate) async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ---------------------------------------------------------------------------
// MockApi
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    user: Value,
    posts: Value,
    conversations: Value,
    notifications: Value,
    stories: Value,
    scripted_posts: VecDeque<(Duration, Value)>,
    failures: HashMap<&'static str, ApiError>,
    calls: HashMap<&'static str, usize>,
    next_id: usize,
}

/// A server held in JSON, so responses go through the same decoding the
/// HTTP client uses.
pub(crate) struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        let state = MockState {
            user: json!({ "id": "u1", "username": "alice" }),
            posts: json!([
                { "id": "p2", "author": "bob", "content": "second", "createdAt": 1700000002000i64 },
                { "id": "p1", "author": "carol", "content": "first", "createdAt": 1700000001000i64 }
            ]),
            conversations: json!([
                { "id": "alice:bob", "participants": ["alice", "bob"], "unread": { "alice": 3 } }
            ]),
            notifications: json!([
                { "id": "n1", "type": "reply", "actor": "bob", "post": "p1", "read": false },
                { "id": "n2", "type": "follow", "actor": "carol", "read": true }
            ]),
            stories: json!([
                { "id": "s1", "username": "bob", "type": "text", "content": "hi",
                  "createdAt": "2024-01-01T00:00:00Z", "expiresAt": "2099-01-01T00:00:00Z" }
            ]),
            ..MockState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_user(&self, value: Value) {
        self.state().user = value;
    }

    pub(crate) fn set_posts(&self, value: Value) {
        self.state().posts = value;
    }

    pub(crate) fn set_conversations(&self, value: Value) {
        self.state().conversations = value;
    }

    pub(crate) fn set_notifications(&self, value: Value) {
        self.state().notifications = value;
    }

    /// Answer the next `fetch_posts` with `value` after `delay`.
    pub(crate) fn script_posts(&self, delay: Duration, value: Value) {
        self.state().scripted_posts.push_back((delay, value));
    }

    /// Make every call to `op` fail with `error`.
    pub(crate) fn fail(&self, op: &'static str, error: ApiError) {
        self.state().failures.insert(op, error);
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) -> Result<(), ApiError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get(op) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    fn find_post(&self, id: &PostId) -> Result<Value, ApiError> {
        self.state()
            .posts
            .as_array()
            .and_then(|posts| posts.iter().find(|p| p["id"] == id.as_str()).cloned())
            .ok_or(ApiError::Server {
                status: 404,
                message: "Post not found".into(),
            })
    }

    fn prepend_post(&self, post: Value) {
        if let Some(posts) = self.state().posts.as_array_mut() {
            posts.insert(0, post);
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    Ok(serde_json::from_value(value)?)
}

/// Collections skip undecodable items, as the HTTP client does.
fn decode_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, ApiError> {
    let collection: RawCollection = serde_json::from_value(value)?;
    Ok(collection.decode_each().0)
}

#[async_trait]
impl ServerApi for MockApi {
    async fn fetch_current_user(&self) -> Result<RawUser, ApiError> {
        self.record("fetch_current_user")?;
        decode(self.state().user.clone())
    }

    async fn fetch_stories(&self) -> Result<Vec<RawStory>, ApiError> {
        self.record("fetch_stories")?;
        decode_list(self.state().stories.clone())
    }

    async fn fetch_posts(&self) -> Result<Vec<RawPost>, ApiError> {
        self.record("fetch_posts")?;
        let (delay, value) = {
            let mut state = self.state();
            match state.scripted_posts.pop_front() {
                Some(scripted) => scripted,
                None => (Duration::ZERO, state.posts.clone()),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        decode_list(value)
    }

    async fn fetch_conversations(&self) -> Result<Vec<RawConversation>, ApiError> {
        self.record("fetch_conversations")?;
        decode_list(self.state().conversations.clone())
    }

    async fn fetch_notifications(&self) -> Result<Vec<RawNotification>, ApiError> {
        self.record("fetch_notifications")?;
        decode_list(self.state().notifications.clone())
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<RawPost, ApiError> {
        self.record("create_post")?;
        let post = json!({ "id": self.next_id("new"), "author": "alice", "content": draft.content });
        self.prepend_post(post.clone());
        decode(post)
    }

    async fn reply_to_post(&self, parent: &PostId, draft: &PostDraft) -> Result<RawPost, ApiError> {
        self.record("reply_to_post")?;
        decode(json!({
            "id": self.next_id("reply"),
            "author": "alice",
            "content": draft.content,
            "parentId": parent.as_str()
        }))
    }

    async fn echo_post(&self, target: &PostId, comment: Option<&str>) -> Result<RawPost, ApiError> {
        self.record("echo_post")?;
        let original = self.find_post(target)?;
        let post = json!({
            "id": self.next_id("echo"),
            "author": "alice",
            "content": comment.unwrap_or_default(),
            "repostOf": original
        });
        self.prepend_post(post.clone());
        decode(post)
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), ApiError> {
        self.record("delete_post")?;
        if let Some(posts) = self.state().posts.as_array_mut() {
            posts.retain(|p| p["id"] != id.as_str());
        }
        Ok(())
    }

    async fn update_post(&self, id: &PostId, _update: &PostUpdate) -> Result<RawPost, ApiError> {
        self.record("update_post")?;
        decode(self.find_post(id)?)
    }

    async fn vote_poll(&self, id: &PostId, _option: usize) -> Result<RawPost, ApiError> {
        self.record("vote_poll")?;
        decode(self.find_post(id)?)
    }

    async fn send_message(
        &self,
        _conversation: &ConversationId,
        draft: &MessageDraft,
    ) -> Result<RawMessage, ApiError> {
        self.record("send_message")?;
        decode(json!({
            "id": self.next_id("m"),
            "sender": "alice",
            "text": draft.text,
            "timestamp": 1700000005000i64
        }))
    }

    async fn mark_conversation_read(&self, _conversation: &ConversationId) -> Result<(), ApiError> {
        self.record("mark_conversation_read")
    }

    async fn get_or_create_conversation(
        &self,
        username: &str,
        encrypted: bool,
    ) -> Result<RawConversation, ApiError> {
        self.record("get_or_create_conversation")?;
        let id = ConversationId::for_pair("alice", username, encrypted);
        let conversation = json!({
            "id": id.as_str(),
            "participants": ["alice", username],
            "encrypted": encrypted
        });
        if let Some(list) = self.state().conversations.as_array_mut() {
            list.push(conversation.clone());
        }
        decode(conversation)
    }

    async fn follow_user(&self, username: &str) -> Result<(), ApiError> {
        self.record("follow_user")?;
        let mut state = self.state();
        let following = state.user["following"].as_array().cloned().unwrap_or_default();
        let mut following: Vec<Value> = following
            .into_iter()
            .filter(|u| u != username)
            .collect();
        following.push(json!(username));
        state.user["following"] = Value::Array(following);
        Ok(())
    }

    async fn unfollow_user(&self, username: &str) -> Result<(), ApiError> {
        self.record("unfollow_user")?;
        let mut state = self.state();
        if let Some(following) = state.user["following"].as_array_mut() {
            following.retain(|u| u != username);
        }
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<RawUser, ApiError> {
        self.record("update_profile")?;
        let patch = serde_json::to_value(update)?;
        let mut state = self.state();
        if let (Some(user), Some(patch)) = (state.user.as_object_mut(), patch.as_object()) {
            for (key, value) in patch {
                user.insert(key.clone(), value.clone());
            }
        }
        decode(state.user.clone())
    }

    async fn mark_notification_read(&self, _id: &NotificationId) -> Result<(), ApiError> {
        self.record("mark_notification_read")
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

pub(crate) struct MockNotifier {
    permission: Permission,
    alerts: Mutex<Vec<Alert>>,
    sounds: Mutex<Vec<Sound>>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self {
            permission: Permission::Granted,
            alerts: Mutex::new(Vec::new()),
            sounds: Mutex::new(Vec::new()),
        }
    }
}

impl MockNotifier {
    pub(crate) fn denied() -> Self {
        Self {
            permission: Permission::Denied,
            ..Self::default()
        }
    }

    pub(crate) fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub(crate) fn sounds(&self) -> Vec<Sound> {
        self.sounds.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn show(&self, alert: &Alert) -> Result<(), String> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn play(&self, sound: Sound) {
        self.sounds.lock().unwrap().push(sound);
    }
}

// ---------------------------------------------------------------------------
// MockPush
// ---------------------------------------------------------------------------

/// Push connector whose far end is driven by the test.
#[derive(Default)]
pub(crate) struct MockPush {
    notifications: Mutex<Option<mpsc::Sender<PushNotification>>>,
    commands: Mutex<Option<mpsc::Receiver<PushCommand>>>,
}

impl MockPush {
    pub(crate) async fn notify(&self, notification: PushNotification) {
        let tx = self.notifications.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(notification).await;
        }
    }

    pub(crate) async fn frame(&self, event: &str, data: Value) {
        self.notify(PushNotification::Frame {
            event: event.into(),
            data,
        })
        .await;
    }

    /// The next command the engine sent to the push task.
    pub(crate) async fn next_command(&self) -> Option<PushCommand> {
        let rx = self.commands.lock().unwrap().take();
        let mut rx = rx?;
        let cmd = rx.recv().await;
        *self.commands.lock().unwrap() = Some(rx);
        cmd
    }
}

impl PushConnector for MockPush {
    fn connect(&self, _credentials: &Credentials) -> Result<PushChannel, PushError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        *self.notifications.lock().unwrap() = Some(event_tx);
        *self.commands.lock().unwrap() = Some(cmd_rx);
        Ok((cmd_tx, event_rx))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub api: Arc<MockApi>,
    pub client: ClientHandle,
    pub notifier: Arc<MockNotifier>,
    pub push: Arc<MockPush>,
}

fn spawn(notifier: MockNotifier) -> Harness {
    let api = Arc::new(MockApi::new());
    let notifier = Arc::new(notifier);
    let push = Arc::new(MockPush::default());
    let client = spawn_client(
        api.clone(),
        notifier.clone(),
        Some(push.clone()),
        EngineOptions {
            request_timeout: Duration::from_secs(15),
            settings: AppSettings::default(),
        },
    );
    Harness {
        api,
        client,
        notifier,
        push,
    }
}

/// A running client with no session.
pub(crate) fn client() -> (ClientHandle, Arc<MockApi>, Arc<MockNotifier>, Arc<MockPush>) {
    let Harness {
        api,
        client,
        notifier,
        push,
    } = spawn(MockNotifier::default());
    (client, api, notifier, push)
}

/// A client logged in as alice with the initial refresh applied.
pub(crate) async fn harness() -> Harness {
    harness_with(MockNotifier::default()).await
}

pub(crate) async fn harness_with(notifier: MockNotifier) -> Harness {
    let harness = spawn(notifier);
    harness.client.login(credentials()).await.unwrap();
    let client = harness.client.clone();
    wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;
    harness
}
