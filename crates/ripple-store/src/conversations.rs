use tracing::debug;

use ripple_shared::models::{Conversation, Message};
use ripple_shared::types::ConversationId;

use crate::error::{Result, StoreError};
use crate::store::{Collection, EntityStore, RefreshTicket};

impl EntityStore {
    /// Replace every conversation with a fetched snapshot.
    ///
    /// Messages pushed after `ticket` was issued are re-appended to their
    /// conversation when the snapshot does not contain them yet.
    pub fn replace_conversations(
        &mut self,
        ticket: RefreshTicket,
        mut conversations: Vec<Conversation>,
    ) -> Result<()> {
        self.admit(ticket, Collection::Conversations)?;

        self.pushed_messages.retain(|_, stamp| *stamp >= ticket.seq);
        let mut carried = 0usize;
        for (conversation_id, message_id) in self.pushed_messages.keys() {
            let Some(pushed) = self
                .conversation(conversation_id)
                .and_then(|c| c.messages.iter().find(|m| &m.id == message_id))
                .cloned()
            else {
                continue;
            };
            if let Some(target) = conversations.iter_mut().find(|c| &c.id == conversation_id) {
                if target.append_message(pushed) {
                    carried += 1;
                }
            }
        }

        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        debug!(
            seq = ticket.seq,
            conversations = conversations.len(),
            carried,
            "Replacing conversations"
        );

        self.conversations = conversations;
        self.mark_applied(ticket, Collection::Conversations);
        Ok(())
    }

    /// Append a pushed message to a known conversation.
    ///
    /// Returns `Ok(false)` when a message with the same id is already there.
    /// Unknown conversations are an error: a bare message does not carry
    /// enough to build one.
    pub fn append_message(
        &mut self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<bool> {
        self.require_session()?;
        let stamp = self.issued_seq;
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| StoreError::UnknownConversation(conversation_id.clone()))?;

        let message_id = message.id.clone();
        if !conversation.append_message(message) {
            return Ok(false);
        }
        self.pushed_messages
            .insert((conversation_id.clone(), message_id), stamp);
        self.conversations
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(true)
    }

    /// Add a conversation the server just created for us. Existing
    /// conversations are left untouched.
    pub fn insert_conversation(&mut self, conversation: Conversation) -> Result<bool> {
        self.require_session()?;
        if self.conversation(&conversation.id).is_some() {
            return Ok(false);
        }
        self.conversations.push(conversation);
        self.conversations
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(true)
    }

    /// Optimistically reset `username`'s unread counter. Counters are never
    /// incremented locally; the next conversation refresh is authoritative.
    pub fn reset_unread(&mut self, conversation_id: &ConversationId, username: &str) -> Result<()> {
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| StoreError::UnknownConversation(conversation_id.clone()))?;
        if let Some(count) = conversation.unread.get_mut(username) {
            *count = 0;
        }
        Ok(())
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Conversations, most recently active first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn total_unread(&self, username: &str) -> u32 {
        self.conversations
            .iter()
            .map(|c| c.unread_for(username))
            .sum()
    }
}
