use serde::Serialize;
use tokio::sync::broadcast;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEndReason {
    Logout,
    /// The server rejected the token.
    Expired,
}

/// State-change notifications for the presentation layer. Payloads carry
/// counts only; views re-query the handle for content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    SessionStarted { username: String },
    SessionEnded { reason: SessionEndReason },
    ProfileUpdated,
    #[serde(rename_all = "camelCase")]
    PostsUpdated { rendered: usize, pending: usize },
    #[serde(rename_all = "camelCase")]
    ConversationsUpdated { unread: u32 },
    #[serde(rename_all = "camelCase")]
    NotificationsUpdated { unread: usize },
    StoriesUpdated { users: usize },
    #[serde(rename_all = "camelCase")]
    AutoRefreshChanged { enabled: bool, paused: bool },
    PushConnected,
    PushDisconnected { reason: String },
    PushUnavailable,
}

pub fn emit_event(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    // No subscribers is normal for headless use.
    if events.send(event).is_err() {
        tracing::trace!("No event subscribers");
    }
}
