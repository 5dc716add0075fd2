//! The cloneable front door to the client engine.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use ripple_net::{ApiError, ServerApi};
use ripple_shared::models::{Conversation, Notification, Post, Story, User};
use ripple_shared::types::{NotificationId, PostId, UserId};

use crate::engine::EngineCommand;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::session::{Credentials, SessionInfo};
use crate::sync::{bounded, RefreshReason, RefreshScope};

/// Auto-refresh state as the presentation layer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub enabled: bool,
    /// A due refresh is being held back by recent user interaction.
    pub paused: bool,
    pub next_refresh_at: Option<Instant>,
}

/// Handle to a running client. Cheap to clone; the engine stops when the
/// last clone is dropped.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    pub(crate) api: Arc<dyn ServerApi>,
    events: broadcast::Sender<ClientEvent>,
    request_timeout: Duration,
}

impl ClientHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<EngineCommand>,
        api: Arc<dyn ServerApi>,
        events: broadcast::Sender<ClientEvent>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cmd_tx,
            api,
            events,
            request_timeout,
        }
    }

    /// Receive state-change events. Lagging receivers miss events, not state.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    // -- Session --

    /// Establish a session and run the initial refresh.
    pub async fn login(&self, credentials: Credentials) -> Result<(), ClientError> {
        self.request(|reply| EngineCommand::Login { credentials, reply })
            .await?
    }

    /// End the session. Safe to call without one.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.request(EngineCommand::Logout).await
    }

    pub async fn is_logged_in(&self) -> Result<bool, ClientError> {
        Ok(self.request(EngineCommand::Session).await?.is_some())
    }

    // -- Refresh and scheduling --

    /// Start a full refresh now. Returns once it is queued.
    pub async fn force_refresh(&self) -> Result<(), ClientError> {
        self.send(EngineCommand::Refresh {
            reason: RefreshReason::Forced,
            scope: RefreshScope::All,
        })
        .await
    }

    /// Like [`Self::force_refresh`] but fails without a session.
    pub async fn force_refresh_checked(&self) -> Result<(), ClientError> {
        self.session().await?;
        self.force_refresh().await
    }

    /// Note user activity. Scheduled refreshes wait for a quiet window.
    pub async fn record_interaction(&self) -> Result<(), ClientError> {
        self.send(EngineCommand::Interaction).await
    }

    pub async fn is_refreshing(&self) -> Result<bool, ClientError> {
        self.request(EngineCommand::Refreshing).await
    }

    pub async fn scheduler_status(&self) -> Result<SchedulerStatus, ClientError> {
        self.request(EngineCommand::Scheduler).await
    }

    pub async fn is_auto_refresh_paused(&self) -> Result<bool, ClientError> {
        Ok(self.scheduler_status().await?.paused)
    }

    pub async fn next_refresh_at(&self) -> Result<Option<Instant>, ClientError> {
        Ok(self.scheduler_status().await?.next_refresh_at)
    }

    // -- Feed --

    /// The rendered feed, newest first. Pending posts are not included.
    pub async fn current_posts(&self) -> Result<Vec<Post>, ClientError> {
        self.request(EngineCommand::Posts).await
    }

    /// Direct replies to a post, in server order.
    pub async fn replies(&self, id: &PostId) -> Result<Vec<Post>, ClientError> {
        self.request(|reply| EngineCommand::Replies(id.clone(), reply))
            .await
    }

    /// The post a repost points at, if it is known.
    pub async fn repost_of(&self, id: &PostId) -> Result<Option<Post>, ClientError> {
        self.request(|reply| EngineCommand::RepostOf(id.clone(), reply))
            .await
    }

    pub async fn pending_count(&self) -> Result<usize, ClientError> {
        self.request(EngineCommand::PendingCount).await
    }

    /// Render every pending post. Returns how many were accepted.
    pub async fn accept_pending(&self) -> Result<usize, ClientError> {
        self.request(EngineCommand::AcceptPending).await
    }

    // -- Other collections --

    pub async fn current_user(&self) -> Result<Option<User>, ClientError> {
        self.request(EngineCommand::CurrentUser).await
    }

    pub async fn current_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.request(EngineCommand::Conversations).await
    }

    pub async fn current_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        self.request(EngineCommand::Notifications).await
    }

    pub async fn stories(&self) -> Result<BTreeMap<UserId, Vec<Story>>, ClientError> {
        self.request(EngineCommand::Stories).await
    }

    /// Mark a notification read locally, then on the server.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.request(|reply| EngineCommand::MarkNotificationRead {
            id: id.clone(),
            reply,
        })
        .await??;
        self.call(&session, self.api.mark_notification_read(id))
            .await
    }

    // -- Plumbing --

    pub(crate) async fn session(&self) -> Result<SessionInfo, ClientError> {
        self.request(EngineCommand::Session)
            .await?
            .ok_or(ClientError::NoSession)
    }

    pub(crate) async fn send(&self, cmd: EngineCommand) -> Result<(), ClientError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::EngineStopped)
    }

    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| ClientError::EngineStopped)
    }

    /// Run a server call for `session` under the request timeout. An auth
    /// failure ends that session.
    pub(crate) async fn call<T>(
        &self,
        session: &SessionInfo,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ClientError> {
        match bounded(self.request_timeout, call).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_auth() {
                    let _ = self.send(EngineCommand::SessionExpired(session.id)).await;
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, wait_until, Harness};
    use serde_json::json;

    #[tokio::test]
    async fn test_mark_read_updates_locally_and_remotely() {
        let Harness { api, client, .. } = harness().await;
        client.mark_read(&NotificationId::new("n1")).await.unwrap();

        let notifications = client.current_notifications().await.unwrap();
        assert!(notifications.iter().all(|n| n.read));
        assert_eq!(api.calls("mark_notification_read"), 1);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_is_error() {
        let Harness { api, client, .. } = harness().await;
        let err = client
            .mark_read(&NotificationId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Store(_)));
        assert_eq!(api.calls("mark_notification_read"), 0);
    }

    #[tokio::test]
    async fn test_replies_and_repost_resolved_from_arena() {
        let Harness { api, client, .. } = harness().await;
        api.set_posts(json!([
            { "id": "p3", "author": "dave", "repostOf": { "id": "p1", "author": "carol" } },
            { "id": "p2", "author": "bob", "replies": [
                { "id": "r1", "author": "carol", "parentId": "p2", "content": "agreed" }
            ] },
            { "id": "p1", "author": "carol" }
        ]));
        client.force_refresh().await.unwrap();
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;

        let replies = client.replies(&PostId::new("p2")).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "agreed");

        let target = client.repost_of(&PostId::new("p3")).await.unwrap();
        assert_eq!(target.map(|p| p.id), Some(PostId::new("p1")));
        assert!(client.repost_of(&PostId::new("p2")).await.unwrap().is_none());
        assert!(client.replies(&PostId::new("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queries_without_session() {
        let (client, _, _, _) = crate::testing::client();
        assert!(!client.is_logged_in().await.unwrap());
        assert!(client.current_posts().await.unwrap().is_empty());
        assert!(matches!(
            client.mark_read(&NotificationId::new("n1")).await,
            Err(ClientError::NoSession)
        ));
        // Logging out without a session is harmless.
        client.logout().await.unwrap();
    }
}
