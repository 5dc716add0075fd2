//! The [`EntityStore`] struct, its session guard and refresh sequencing.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use ripple_shared::models::{Conversation, Notification, Post, Story, User};
use ripple_shared::types::{ConversationId, MessageId, NotificationId, PostId, SessionId, UserId};

use crate::error::{Result, StoreError};

/// Entity collections that can be replaced wholesale by a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Posts,
    Conversations,
    Notifications,
    Stories,
    User,
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Posts => "posts",
            Self::Conversations => "conversations",
            Self::Notifications => "notifications",
            Self::Stories => "stories",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Issued when a refresh starts and carried by each of its results.
///
/// `seq` is strictly increasing for the lifetime of the store, across
/// sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub seq: u64,
    pub session: SessionId,
}

/// In-memory holder of everything the client knows.
#[derive(Debug, Default)]
pub struct EntityStore {
    pub(crate) session: Option<SessionId>,
    pub(crate) current_user: Option<User>,

    /// Post arena. Replies and repost targets live here too.
    pub(crate) posts: HashMap<PostId, Post>,
    /// Top-level feed order as last fetched, newest pushes first.
    pub(crate) feed: Vec<PostId>,

    pub(crate) conversations: Vec<Conversation>,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) stories: BTreeMap<UserId, Vec<Story>>,

    /// Highest issued refresh seq.
    pub(crate) issued_seq: u64,
    /// Last applied seq per collection.
    pub(crate) applied: HashMap<Collection, u64>,

    /// Push patches, stamped with `issued_seq` at the time they landed.
    pub(crate) pushed_posts: HashMap<PostId, u64>,
    pub(crate) pushed_messages: HashMap<(ConversationId, MessageId), u64>,
    pub(crate) pushed_notifications: HashMap<NotificationId, u64>,
}

impl EntityStore {
    /// Create an empty store with no active session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a session. Any state from a previous session is discarded.
    pub fn start_session(&mut self, session: SessionId) {
        self.clear();
        self.session = Some(session);
        info!(session = %session, "Store session started");
    }

    /// End the session and clear every collection. Results still in flight
    /// for the old session will be rejected when they arrive.
    pub fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session = %session, "Store session ended");
        }
        self.clear();
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    fn clear(&mut self) {
        self.current_user = None;
        self.posts.clear();
        self.feed.clear();
        self.conversations.clear();
        self.notifications.clear();
        self.stories.clear();
        self.applied.clear();
        self.pushed_posts.clear();
        self.pushed_messages.clear();
        self.pushed_notifications.clear();
    }

    /// Allocate the ticket for a new refresh.
    pub fn begin_refresh(&mut self) -> Result<RefreshTicket> {
        let session = self.session.ok_or(StoreError::NoSession)?;
        self.issued_seq += 1;
        debug!(seq = self.issued_seq, "Refresh ticket issued");
        Ok(RefreshTicket {
            seq: self.issued_seq,
            session,
        })
    }

    /// Highest seq handed out so far.
    pub fn issued_seq(&self) -> u64 {
        self.issued_seq
    }

    pub fn last_applied(&self, collection: Collection) -> u64 {
        self.applied.get(&collection).copied().unwrap_or(0)
    }

    /// Reject results from another session or older than what is applied.
    pub(crate) fn admit(&self, ticket: RefreshTicket, collection: Collection) -> Result<()> {
        if self.session != Some(ticket.session) {
            return Err(StoreError::SessionMismatch {
                ticket: ticket.session,
                current: self.session,
            });
        }
        let last_applied = self.last_applied(collection);
        if ticket.seq <= last_applied {
            return Err(StoreError::StaleSnapshot {
                collection,
                seq: ticket.seq,
                last_applied,
            });
        }
        Ok(())
    }

    pub(crate) fn mark_applied(&mut self, ticket: RefreshTicket, collection: Collection) {
        self.applied.insert(collection, ticket.seq);
    }

    pub(crate) fn require_session(&self) -> Result<()> {
        if self.session.is_none() {
            return Err(StoreError::NoSession);
        }
        Ok(())
    }
}
