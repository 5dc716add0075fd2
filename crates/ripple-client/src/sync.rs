//! Full-state refresh.
//!
//! A refresh takes a ticket from the store and fans out one fetch task per
//! collection. Each result comes back to the engine loop tagged with that
//! ticket and is applied independently; the store throws away anything
//! stale or from an ended session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use ripple_net::{ApiError, ServerApi};
use ripple_shared::models::Notification;
use ripple_shared::normalize;
use ripple_shared::wire::{RawConversation, RawNotification, RawPost, RawStory, RawUser};
use ripple_store::{Collection, RefreshTicket, StoreError};

use crate::engine::Engine;
use crate::events::{emit_event, ClientEvent, SessionEndReason};
use crate::notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Login,
    Scheduled,
    Forced,
    /// A pushed post was inserted; fetch the authoritative feed around it.
    NewPost,
    /// A message arrived for a conversation we have never seen.
    UnknownConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    All,
    Conversations,
}

impl RefreshScope {
    fn collections(self) -> &'static [Collection] {
        match self {
            Self::All => &[
                Collection::User,
                Collection::Stories,
                Collection::Posts,
                Collection::Conversations,
                Collection::Notifications,
            ],
            Self::Conversations => &[Collection::Conversations],
        }
    }
}

/// Bookkeeping for a refresh whose fetches have not all returned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlight {
    remaining: usize,
    scheduled: bool,
}

#[derive(Debug)]
pub(crate) enum FetchPayload {
    User(Result<RawUser, ApiError>),
    Stories(Result<Vec<RawStory>, ApiError>),
    Posts(Result<Vec<RawPost>, ApiError>),
    Conversations(Result<Vec<RawConversation>, ApiError>),
    Notifications(Result<Vec<RawNotification>, ApiError>),
}

#[derive(Debug)]
pub(crate) struct FetchOutcome {
    pub(crate) ticket: RefreshTicket,
    pub(crate) payload: FetchPayload,
}

impl Engine {
    /// Start a refresh. A no-op without a session.
    pub(crate) fn refresh(&mut self, reason: RefreshReason, scope: RefreshScope) {
        let ticket = match self.store.begin_refresh() {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(reason = ?reason, error = %e, "Refresh skipped");
                if reason == RefreshReason::Scheduled {
                    self.scheduler.refresh_finished();
                }
                return;
            }
        };

        let collections = scope.collections();
        info!(seq = ticket.seq, reason = ?reason, scope = ?scope, "Refresh started");
        for collection in collections {
            spawn_fetch(
                self.api.clone(),
                *collection,
                ticket,
                self.request_timeout,
                self.fetch_tx.clone(),
            );
        }
        self.in_flight.insert(
            ticket.seq,
            InFlight {
                remaining: collections.len(),
                scheduled: reason == RefreshReason::Scheduled,
            },
        );
    }

    pub(crate) fn apply_fetch(&mut self, outcome: FetchOutcome) {
        let FetchOutcome { ticket, payload } = outcome;
        self.settle(ticket.seq);

        if self.session.as_ref().map(|s| s.id) != Some(ticket.session) {
            debug!(seq = ticket.seq, "Discarding result from ended session");
            return;
        }

        match payload {
            FetchPayload::User(Ok(raw)) => self.apply_user(ticket, raw),
            FetchPayload::Stories(Ok(raw)) => self.apply_stories(ticket, raw),
            FetchPayload::Posts(Ok(raw)) => self.apply_posts(ticket, raw),
            FetchPayload::Conversations(Ok(raw)) => self.apply_conversations(ticket, raw),
            FetchPayload::Notifications(Ok(raw)) => self.apply_notifications(ticket, raw),
            FetchPayload::User(Err(e)) => self.fetch_failed(Collection::User, e),
            FetchPayload::Stories(Err(e)) => self.fetch_failed(Collection::Stories, e),
            FetchPayload::Posts(Err(e)) => self.fetch_failed(Collection::Posts, e),
            FetchPayload::Conversations(Err(e)) => {
                self.fetch_failed(Collection::Conversations, e)
            }
            FetchPayload::Notifications(Err(e)) => {
                self.fetch_failed(Collection::Notifications, e)
            }
        }
    }

    fn settle(&mut self, seq: u64) {
        let Some(entry) = self.in_flight.get_mut(&seq) else {
            return;
        };
        entry.remaining = entry.remaining.saturating_sub(1);
        if entry.remaining == 0 {
            let scheduled = entry.scheduled;
            self.in_flight.remove(&seq);
            if scheduled {
                self.scheduler.refresh_finished();
            }
            debug!(seq, "Refresh settled");
        }
    }

    fn fetch_failed(&mut self, collection: Collection, error: ApiError) {
        if error.is_auth() {
            warn!(collection = %collection, "Fetch unauthorized, ending session");
            self.end_session(SessionEndReason::Expired);
        } else {
            // The previous state stays in place until the next refresh.
            warn!(
                collection = %collection,
                transient = error.is_transient(),
                error = %error,
                "Fetch failed"
            );
        }
    }

    fn rejected(&self, collection: Collection, error: StoreError) {
        if error.is_benign() {
            debug!(collection = %collection, reason = %error, "Snapshot not applied");
        } else {
            warn!(collection = %collection, error = %error, "Snapshot rejected");
        }
    }

    // -- Per-collection application --

    fn apply_user(&mut self, ticket: RefreshTicket, raw: RawUser) {
        let user = match normalize::user(raw) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Dropping malformed current user");
                return;
            }
        };
        if let Err(e) = self.store.replace_current_user(ticket, user) {
            return self.rejected(Collection::User, e);
        }
        self.sync_preferences();
        emit_event(&self.events, ClientEvent::ProfileUpdated);
    }

    fn apply_stories(&mut self, ticket: RefreshTicket, raw: Vec<RawStory>) {
        let stories = normalize_each("story", raw, normalize::story);
        if let Err(e) = self.store.merge_stories(ticket, stories) {
            return self.rejected(Collection::Stories, e);
        }
        emit_event(
            &self.events,
            ClientEvent::StoriesUpdated {
                users: self.store.stories().len(),
            },
        );
    }

    fn apply_posts(&mut self, ticket: RefreshTicket, raw: Vec<RawPost>) {
        let batch = normalize::posts(raw);
        if batch.skipped > 0 {
            warn!(skipped = batch.skipped, "Dropped malformed posts");
        }
        if let Err(e) = self.store.replace_posts(ticket, batch) {
            return self.rejected(Collection::Posts, e);
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };
        let store = &self.store;
        let outcome = self.feed.reconcile(store.feed_ids(), |id| {
            store
                .post(id)
                .map_or(false, |p| session.is_me(&p.author.username))
        });
        if outcome.buffered > 0 {
            info!(
                seq = ticket.seq,
                new = outcome.buffered,
                pending = self.feed.pending_count(),
                "New posts pending"
            );
        }
        self.emit_posts_updated();
    }

    fn apply_conversations(&mut self, ticket: RefreshTicket, raw: Vec<RawConversation>) {
        let conversations = normalize_each("conversation", raw, normalize::conversation);
        if let Err(e) = self.store.replace_conversations(ticket, conversations) {
            return self.rejected(Collection::Conversations, e);
        }
        self.emit_conversations_updated();
    }

    fn apply_notifications(&mut self, ticket: RefreshTicket, raw: Vec<RawNotification>) {
        let notifications = normalize_each("notification", raw, normalize::notification);
        if let Err(e) = self
            .store
            .replace_notifications(ticket, notifications.clone())
        {
            return self.rejected(Collection::Notifications, e);
        }
        for notification in &notifications {
            self.deliver_if_unseen(notification);
        }
        self.emit_notifications_updated();
    }

    /// Alert an unread notification the session has not surfaced yet; a read
    /// one is only recorded as seen.
    pub(crate) fn deliver_if_unseen(&mut self, notification: &Notification) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if notification.read {
            session.seen.insert(notification.id.clone());
            return;
        }
        let related = notification
            .related_post
            .as_ref()
            .and_then(|id| self.store.post(id));
        notify::deliver(
            self.notifier.as_ref(),
            &mut session.seen,
            notification,
            related,
        );
    }
}

fn normalize_each<R, T, E: std::fmt::Display>(
    entity: &'static str,
    raw: Vec<R>,
    f: impl Fn(R) -> Result<T, E>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        match f(item) {
            Ok(value) => out.push(value),
            Err(e) => warn!(entity, error = %e, "Skipping malformed entity"),
        }
    }
    out
}

fn spawn_fetch(
    api: Arc<dyn ServerApi>,
    collection: Collection,
    ticket: RefreshTicket,
    limit: Duration,
    tx: mpsc::UnboundedSender<FetchOutcome>,
) {
    tokio::spawn(async move {
        let payload = match collection {
            Collection::User => FetchPayload::User(bounded(limit, api.fetch_current_user()).await),
            Collection::Stories => FetchPayload::Stories(bounded(limit, api.fetch_stories()).await),
            Collection::Posts => FetchPayload::Posts(bounded(limit, api.fetch_posts()).await),
            Collection::Conversations => {
                FetchPayload::Conversations(bounded(limit, api.fetch_conversations()).await)
            }
            Collection::Notifications => {
                FetchPayload::Notifications(bounded(limit, api.fetch_notifications()).await)
            }
        };
        // The engine may already be gone.
        let _ = tx.send(FetchOutcome { ticket, payload });
    });
}

/// Run an API call under the request timeout.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    time::timeout(limit, call)
        .await
        .unwrap_or(Err(ApiError::Timeout))
}
