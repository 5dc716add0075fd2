use ripple_shared::types::{ConversationId, NotificationId, SessionId};
use thiserror::Error;

use crate::store::Collection;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A snapshot older than (or equal to) the last applied one arrived.
    #[error("Stale {collection} snapshot: seq {seq} <= last applied {last_applied}")]
    StaleSnapshot {
        collection: Collection,
        seq: u64,
        last_applied: u64,
    },

    /// A result from a session that has since ended.
    #[error("Result belongs to session {ticket}, current session is {current:?}")]
    SessionMismatch {
        ticket: SessionId,
        current: Option<SessionId>,
    },

    /// No session is active.
    #[error("No active session")]
    NoSession,

    /// The conversation is not known locally.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// The notification is not known locally.
    #[error("Unknown notification: {0}")]
    UnknownNotification(NotificationId),
}

impl StoreError {
    /// Rejections that are expected under normal operation and only worth a
    /// debug line.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::StaleSnapshot { .. } | Self::SessionMismatch { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
