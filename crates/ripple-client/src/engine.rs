//! The single state-mutation actor.
//!
//! The engine task owns the entity store, the session (with its seen set),
//! the feed view and the poll scheduler. Handle calls, fetch results, push
//! notifications and scheduler ticks all arrive through channels and are
//! applied one at a time, so no two writers ever interleave.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ripple_net::{PushCommand, PushNotification, ServerApi};
use ripple_shared::constants::SCHEDULER_TICK;
use ripple_shared::models::{Conversation, Notification, Post, Story, User};
use ripple_shared::types::{ConversationId, NotificationId, PostId, SessionId, UserId};
use ripple_store::EntityStore;

use crate::commands::settings::AppSettings;
use crate::error::ClientError;
use crate::events::{emit_event, ClientEvent, SessionEndReason};
use crate::handle::{ClientHandle, SchedulerStatus};
use crate::notify::Notifier;
use crate::pending::FeedView;
use crate::push_bridge::PushConnector;
use crate::scheduler::{PollScheduler, Tick};
use crate::session::{Credentials, Session, SessionInfo};
use crate::sync::{FetchOutcome, InFlight, RefreshReason, RefreshScope};

type Reply<T> = oneshot::Sender<T>;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent *into* the engine task by [`ClientHandle`].
#[derive(Debug)]
pub(crate) enum EngineCommand {
    Login {
        credentials: Credentials,
        reply: Reply<Result<(), ClientError>>,
    },
    Logout(Reply<()>),
    /// An API call made on behalf of `session` was rejected as unauthorized.
    SessionExpired(SessionId),
    Refresh {
        reason: RefreshReason,
        scope: RefreshScope,
    },
    Interaction,
    SetAutoRefresh {
        settings: AppSettings,
        reply: Reply<AppSettings>,
    },
    AcceptPending(Reply<usize>),
    MarkNotificationRead {
        id: NotificationId,
        reply: Reply<Result<(), ClientError>>,
    },
    ResetUnread {
        conversation: ConversationId,
        reply: Reply<Result<(), ClientError>>,
    },
    InsertConversation {
        conversation: Conversation,
        reply: Reply<Result<(), ClientError>>,
    },
    MergeUser(User),

    // -- Queries --
    Session(Reply<Option<SessionInfo>>),
    Posts(Reply<Vec<Post>>),
    Replies(PostId, Reply<Vec<Post>>),
    RepostOf(PostId, Reply<Option<Post>>),
    PendingCount(Reply<usize>),
    Conversations(Reply<Vec<Conversation>>),
    Conversation(ConversationId, Reply<Option<Conversation>>),
    Notifications(Reply<Vec<Notification>>),
    Stories(Reply<BTreeMap<UserId, Vec<Story>>>),
    CurrentUser(Reply<Option<User>>),
    Settings(Reply<AppSettings>),
    Scheduler(Reply<SchedulerStatus>),
    Refreshing(Reply<bool>),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub request_timeout: Duration,
    /// Refresh preferences used until the user's profile provides them.
    pub settings: AppSettings,
}

pub(crate) struct Engine {
    pub(crate) api: Arc<dyn ServerApi>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) push: Option<Arc<dyn PushConnector>>,
    pub(crate) request_timeout: Duration,
    pub(crate) settings: AppSettings,

    pub(crate) store: EntityStore,
    pub(crate) session: Option<Session>,
    pub(crate) feed: FeedView,
    pub(crate) scheduler: PollScheduler,
    /// Outstanding fetches per refresh seq.
    pub(crate) in_flight: HashMap<u64, InFlight>,

    pub(crate) push_tx: Option<mpsc::Sender<PushCommand>>,
    pub(crate) push_rx: Option<mpsc::Receiver<PushNotification>>,
    pub(crate) fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
}

/// Spawn the engine task and return a handle to it.
///
/// The engine runs until every [`ClientHandle`] clone is dropped. `push` is
/// optional so the client can run refresh-only.
pub fn spawn_client(
    api: Arc<dyn ServerApi>,
    notifier: Arc<dyn Notifier>,
    push: Option<Arc<dyn PushConnector>>,
    options: EngineOptions,
) -> ClientHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>(256);
    let (fetch_tx, fetch_rx) = mpsc::unbounded_channel::<FetchOutcome>();
    let (events, _) = broadcast::channel::<ClientEvent>(256);

    let engine = Engine {
        api: api.clone(),
        notifier,
        push,
        request_timeout: options.request_timeout,
        scheduler: PollScheduler::new(options.settings.refresh_interval_minutes),
        settings: options.settings,
        store: EntityStore::new(),
        session: None,
        feed: FeedView::new(),
        in_flight: HashMap::new(),
        push_tx: None,
        push_rx: None,
        fetch_tx,
        events: events.clone(),
    };

    tokio::spawn(engine.run(cmd_rx, fetch_rx));

    ClientHandle::new(cmd_tx, api, events, options.request_timeout)
}

impl Engine {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<EngineCommand>,
        mut fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    ) {
        let mut ticker = time::interval(SCHEDULER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // --- Handle commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("All client handles dropped, shutting down engine");
                            break;
                        }
                    }
                }

                // --- Fetch results ---
                Some(outcome) = fetch_rx.recv() => {
                    self.apply_fetch(outcome);
                }

                // --- Push channel ---
                notification = next_push(&mut self.push_rx) => {
                    self.handle_push(notification);
                }

                // --- Scheduler ---
                _ = ticker.tick() => {
                    self.on_tick();
                }
            }
        }

        self.end_session(SessionEndReason::Logout);
        info!("Engine loop terminated");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Login { credentials, reply } => {
                let _ = reply.send(self.login(credentials));
            }
            EngineCommand::Logout(reply) => {
                self.end_session(SessionEndReason::Logout);
                let _ = reply.send(());
            }
            EngineCommand::SessionExpired(session) => {
                if self.store.session() == Some(session) {
                    warn!(session = %session, "Session rejected by server");
                    self.end_session(SessionEndReason::Expired);
                }
            }
            EngineCommand::Refresh { reason, scope } => self.refresh(reason, scope),
            EngineCommand::Interaction => {
                self.scheduler.record_interaction(Instant::now());
            }
            EngineCommand::SetAutoRefresh { settings, reply } => {
                self.apply_settings(settings);
                let _ = reply.send(self.settings);
            }
            EngineCommand::AcceptPending(reply) => {
                let accepted = self.feed.accept_pending();
                if accepted > 0 {
                    debug!(accepted, "Pending posts accepted");
                    self.emit_posts_updated();
                }
                let _ = reply.send(accepted);
            }
            EngineCommand::MarkNotificationRead { id, reply } => {
                let result = self
                    .store
                    .mark_notification_read(&id)
                    .map_err(ClientError::from);
                if result.is_ok() {
                    self.emit_notifications_updated();
                }
                let _ = reply.send(result);
            }
            EngineCommand::ResetUnread {
                conversation,
                reply,
            } => {
                let _ = reply.send(self.reset_unread(&conversation));
            }
            EngineCommand::InsertConversation {
                conversation,
                reply,
            } => {
                let result = self
                    .store
                    .insert_conversation(conversation)
                    .map(|_| ())
                    .map_err(ClientError::from);
                if result.is_ok() {
                    self.emit_conversations_updated();
                }
                let _ = reply.send(result);
            }
            EngineCommand::MergeUser(user) => {
                if self.session.is_some() {
                    self.store.merge_current_user(user);
                    self.sync_preferences();
                    emit_event(&self.events, ClientEvent::ProfileUpdated);
                }
            }

            EngineCommand::Session(reply) => {
                let info = self.session.as_ref().map(|s| SessionInfo {
                    id: s.id,
                    credentials: s.credentials.clone(),
                });
                let _ = reply.send(info);
            }
            EngineCommand::Posts(reply) => {
                let _ = reply.send(self.store.posts_by_id(self.feed.rendered()));
            }
            EngineCommand::Replies(id, reply) => {
                let replies = self.store.replies_of(&id).into_iter().cloned().collect();
                let _ = reply.send(replies);
            }
            EngineCommand::RepostOf(id, reply) => {
                let target = self
                    .store
                    .post(&id)
                    .and_then(|post| self.store.repost_target(post))
                    .cloned();
                let _ = reply.send(target);
            }
            EngineCommand::PendingCount(reply) => {
                let _ = reply.send(self.feed.pending_count());
            }
            EngineCommand::Conversations(reply) => {
                let _ = reply.send(self.store.conversations().to_vec());
            }
            EngineCommand::Conversation(id, reply) => {
                let _ = reply.send(self.store.conversation(&id).cloned());
            }
            EngineCommand::Notifications(reply) => {
                let _ = reply.send(self.store.notifications().to_vec());
            }
            EngineCommand::Stories(reply) => {
                let _ = reply.send(self.store.stories().clone());
            }
            EngineCommand::CurrentUser(reply) => {
                let _ = reply.send(self.store.current_user().cloned());
            }
            EngineCommand::Settings(reply) => {
                let _ = reply.send(self.settings);
            }
            EngineCommand::Scheduler(reply) => {
                let _ = reply.send(SchedulerStatus {
                    enabled: self.scheduler.is_enabled(),
                    paused: self.scheduler.is_paused(),
                    next_refresh_at: self.scheduler.next_refresh_at(),
                });
            }
            EngineCommand::Refreshing(reply) => {
                let _ = reply.send(!self.in_flight.is_empty());
            }
        }
    }

    // -- Session lifecycle --

    fn login(&mut self, credentials: Credentials) -> Result<(), ClientError> {
        if let Some(current) = &self.session {
            return Err(ClientError::AlreadyLoggedIn(current.username().to_string()));
        }

        let session = Session::new(credentials);
        self.store.start_session(session.id);
        self.feed.clear();

        if let Some(connector) = &self.push {
            match connector.connect(&session.credentials) {
                Ok((tx, rx)) => {
                    self.push_tx = Some(tx);
                    self.push_rx = Some(rx);
                }
                Err(e) => {
                    warn!(error = %e, "Push channel unavailable, refresh only");
                    emit_event(&self.events, ClientEvent::PushUnavailable);
                }
            }
        }

        info!(session = %session.id, user = %session.username(), "Session started");
        emit_event(
            &self.events,
            ClientEvent::SessionStarted {
                username: session.username().to_string(),
            },
        );
        self.session = Some(session);

        self.scheduler.configure(
            self.settings.auto_refresh,
            self.settings.refresh_interval_minutes,
            Instant::now(),
        );
        self.refresh(RefreshReason::Login, RefreshScope::All);
        Ok(())
    }

    /// Clear everything the session owned. Results still in flight are
    /// rejected by the store's session guard when they land.
    pub(crate) fn end_session(&mut self, reason: SessionEndReason) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Some(tx) = self.push_tx.take() {
            let _ = tx.try_send(PushCommand::Shutdown);
        }
        self.push_rx = None;
        self.scheduler.stop();
        self.in_flight.clear();
        self.feed.clear();
        self.store.end_session();

        info!(
            session = %session.id,
            reason = ?reason,
            seen = session.seen.len(),
            "Session ended"
        );
        emit_event(&self.events, ClientEvent::SessionEnded { reason });
    }

    // -- Scheduler --

    fn on_tick(&mut self) {
        if self.session.is_none() {
            return;
        }
        let was_paused = self.scheduler.is_paused();
        if self.scheduler.tick(Instant::now()) == Tick::Fire {
            self.refresh(RefreshReason::Scheduled, RefreshScope::All);
        }
        if was_paused != self.scheduler.is_paused() {
            self.emit_auto_refresh_changed();
        }
    }

    fn apply_settings(&mut self, settings: AppSettings) {
        let settings = settings.normalized();
        self.settings = settings;
        if self.session.is_some() {
            self.scheduler.configure(
                settings.auto_refresh,
                settings.refresh_interval_minutes,
                Instant::now(),
            );
        }
        info!(
            enabled = settings.auto_refresh,
            minutes = settings.refresh_interval_minutes,
            "Auto-refresh settings applied"
        );
        self.emit_auto_refresh_changed();
    }

    /// Adopt refresh preferences stored on the user's profile.
    pub(crate) fn sync_preferences(&mut self) {
        let Some(prefs) = self.store.current_user().and_then(|u| u.preferences) else {
            return;
        };
        let settings = AppSettings {
            auto_refresh: prefs.auto_refresh,
            refresh_interval_minutes: prefs.interval_minutes,
        }
        .normalized();
        if settings != self.settings {
            self.apply_settings(settings);
        }
    }

    fn reset_unread(&mut self, conversation: &ConversationId) -> Result<(), ClientError> {
        let username = self
            .session
            .as_ref()
            .map(|s| s.username().to_string())
            .ok_or(ClientError::NoSession)?;
        self.store.reset_unread(conversation, &username)?;
        self.emit_conversations_updated();
        Ok(())
    }

    // -- Events --

    pub(crate) fn emit_posts_updated(&self) {
        emit_event(
            &self.events,
            ClientEvent::PostsUpdated {
                rendered: self.feed.rendered().len(),
                pending: self.feed.pending_count(),
            },
        );
    }

    pub(crate) fn emit_conversations_updated(&self) {
        let unread = self
            .session
            .as_ref()
            .map_or(0, |s| self.store.total_unread(s.username()));
        emit_event(&self.events, ClientEvent::ConversationsUpdated { unread });
    }

    pub(crate) fn emit_notifications_updated(&self) {
        emit_event(
            &self.events,
            ClientEvent::NotificationsUpdated {
                unread: self.store.unread_notification_count(),
            },
        );
    }

    fn emit_auto_refresh_changed(&self) {
        emit_event(
            &self.events,
            ClientEvent::AutoRefreshChanged {
                enabled: self.scheduler.is_enabled(),
                paused: self.scheduler.is_paused(),
            },
        );
    }
}

async fn next_push(rx: &mut Option<mpsc::Receiver<PushNotification>>) -> Option<PushNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, wait_until, Harness};
    use ripple_net::ApiError;
    use serde_json::json;

    #[tokio::test]
    async fn test_login_runs_initial_refresh() {
        let Harness { api, client, .. } = harness().await;

        let user = client.current_user().await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        for op in [
            "fetch_current_user",
            "fetch_stories",
            "fetch_posts",
            "fetch_conversations",
            "fetch_notifications",
        ] {
            assert_eq!(api.calls(op), 1, "{op}");
        }
    }

    #[tokio::test]
    async fn test_double_login_rejected() {
        let Harness { client, .. } = harness().await;
        let err = client
            .login(crate::testing::credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AlreadyLoggedIn(name) if name == "alice"));
    }

    #[tokio::test]
    async fn test_logout_clears_state_and_stops_push() {
        let Harness { client, push, .. } = harness().await;
        assert!(!client.current_posts().await.unwrap().is_empty());
        let mut events = client.subscribe();

        client.logout().await.unwrap();

        assert!(client.current_posts().await.unwrap().is_empty());
        assert!(client.current_notifications().await.unwrap().is_empty());
        assert!(client.current_user().await.unwrap().is_none());
        assert!(!client.scheduler_status().await.unwrap().enabled);
        assert_eq!(push.next_command().await, Some(PushCommand::Shutdown));
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::SessionEnded {
                reason: SessionEndReason::Logout
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_discards_in_flight_refresh() {
        let Harness { api, client, .. } = harness().await;
        api.script_posts(
            Duration::from_secs(5),
            json!([{ "id": "late", "author": "bob" }]),
        );
        client.force_refresh().await.unwrap();
        client.logout().await.unwrap();

        time::sleep(Duration::from_secs(6)).await;
        assert!(client.current_posts().await.unwrap().is_empty());

        // A new session is not polluted by the old response either.
        client.login(crate::testing::credentials()).await.unwrap();
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;
        let ids: Vec<String> = client
            .current_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert!(!ids.contains(&"late".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_refresh_rejected() {
        let Harness { api, client, .. } = harness().await;

        // The older request is slow and returns a stale feed.
        api.script_posts(Duration::from_secs(5), json!([{ "id": "stale", "author": "bob" }]));
        client.force_refresh().await.unwrap();
        api.script_posts(Duration::ZERO, json!([{ "id": "fresh", "author": "bob" }]));
        client.force_refresh().await.unwrap();

        time::sleep(Duration::from_secs(6)).await;
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;

        client.accept_pending().await.unwrap();
        let ids: Vec<String> = client
            .current_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_auth_failure_ends_session() {
        let Harness { api, client, .. } = harness().await;
        let mut events = client.subscribe();
        api.fail("fetch_notifications", ApiError::Unauthorized);

        client.force_refresh().await.unwrap();

        loop {
            match events.recv().await.unwrap() {
                ClientEvent::SessionEnded { reason } => {
                    assert_eq!(reason, SessionEndReason::Expired);
                    break;
                }
                _ => continue,
            }
        }
        assert!(client.current_posts().await.unwrap().is_empty());
        assert!(matches!(
            client.force_refresh_checked().await,
            Err(ClientError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_block_siblings() {
        let Harness { api, client, .. } = harness().await;
        api.fail("fetch_posts", ApiError::Network("connection refused".into()));
        api.set_notifications(json!([
            { "id": "n9", "type": "follow", "actor": "carol", "read": true }
        ]));

        client.force_refresh().await.unwrap();
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;

        // Posts kept from the last good refresh, notifications updated.
        assert_eq!(client.current_posts().await.unwrap().len(), 2);
        let notifications = client.current_notifications().await.unwrap();
        assert!(notifications.iter().any(|n| n.id.as_str() == "n9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_is_bounded() {
        let Harness { api, client, .. } = harness().await;
        api.script_posts(Duration::from_secs(60), json!([]));
        client.force_refresh().await.unwrap();

        // The 15s request timeout settles the refresh long before 60s.
        time::sleep(Duration::from_secs(16)).await;
        assert!(!client.is_refreshing().await.unwrap());
        assert_eq!(client.current_posts().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_does_not_hold_back_siblings() {
        let Harness {
            api,
            client,
            notifier,
            ..
        } = harness().await;
        api.script_posts(Duration::from_secs(60), json!([]));
        api.set_notifications(json!([
            { "id": "n9", "type": "follow", "actor": "dave", "read": false },
            { "id": "n1", "type": "reply", "actor": "bob", "read": false }
        ]));
        client.force_refresh().await.unwrap();

        // Well inside the request timeout, posts are still outstanding.
        time::sleep(Duration::from_secs(1)).await;
        assert!(client.is_refreshing().await.unwrap());

        let notifications = client.current_notifications().await.unwrap();
        assert!(notifications.iter().any(|n| n.id.as_str() == "n9"));
        assert!(notifier.alerts().iter().any(|a| a.tag == "n9"));
        assert_eq!(client.current_posts().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_defers_while_interacting() {
        let Harness { api, client, .. } = harness().await;
        client.set_auto_refresh(true, 1).await.unwrap();
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;
        let before = api.calls("fetch_posts");

        time::sleep(Duration::from_secs(59)).await;
        client.record_interaction().await.unwrap();
        time::sleep(Duration::from_secs(2)).await;

        let status = client.scheduler_status().await.unwrap();
        assert!(status.paused);
        assert!(client.is_auto_refresh_paused().await.unwrap());
        assert_eq!(api.calls("fetch_posts"), before);

        // Once the user goes quiet the deferred refresh runs.
        time::sleep(Duration::from_secs(40)).await;
        assert_eq!(api.calls("fetch_posts"), before + 1);
        assert!(!client.is_auto_refresh_paused().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_auto_refresh_stops_polling() {
        let Harness { api, client, .. } = harness().await;
        client.set_auto_refresh(false, 1).await.unwrap();
        wait_until(|| async { !client.is_refreshing().await.unwrap() }).await;
        let before = api.calls("fetch_posts");

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(api.calls("fetch_posts"), before);
        assert!(client.next_refresh_at().await.unwrap().is_none());
    }
}
