use tracing::{debug, info};

use ripple_net::MessageDraft;
use ripple_shared::models::{Conversation, Message};
use ripple_shared::normalize;
use ripple_shared::types::ConversationId;

use crate::engine::EngineCommand;
use crate::error::ClientError;
use crate::handle::ClientHandle;
use crate::sync::{RefreshReason, RefreshScope};

impl ClientHandle {
    pub async fn send_message(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> Result<Message, ClientError> {
        if draft.text.trim().is_empty() && draft.media.is_none() {
            return Err(ClientError::InvalidInput("message is empty".into()));
        }
        let session = self.session().await?;
        let raw = self
            .call(&session, self.api.send_message(conversation, &draft))
            .await?;
        let message = normalize::message(raw)?;
        debug!(conversation = %conversation, message = %message.id, "Message sent");
        self.force_refresh().await?;
        Ok(message)
    }

    /// Zero the user's unread count at once, then tell the server.
    pub async fn mark_conversation_read(
        &self,
        conversation: &ConversationId,
    ) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.request(|reply| EngineCommand::ResetUnread {
            conversation: conversation.clone(),
            reply,
        })
        .await??;
        self.call(&session, self.api.mark_conversation_read(conversation))
            .await?;
        self.force_refresh().await
    }

    /// Return the conversation with `username`, asking the server to
    /// create it if it is not known locally.
    pub async fn get_or_create_conversation(
        &self,
        username: &str,
        encrypted: bool,
    ) -> Result<Conversation, ClientError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::InvalidInput("username is empty".into()));
        }
        let session = self.session().await?;
        if username == session.username() {
            return Err(ClientError::InvalidInput(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let local_id = ConversationId::for_pair(session.username(), username, encrypted);
        if let Some(existing) = self
            .request(|reply| EngineCommand::Conversation(local_id.clone(), reply))
            .await?
        {
            return Ok(existing);
        }

        let raw = self
            .call(
                &session,
                self.api.get_or_create_conversation(username, encrypted),
            )
            .await?;
        let conversation = normalize::conversation(raw)?;
        self.request(|reply| EngineCommand::InsertConversation {
            conversation: conversation.clone(),
            reply,
        })
        .await??;
        info!(conversation = %conversation.id, with = %username, "Conversation opened");

        self.send(EngineCommand::Refresh {
            reason: RefreshReason::Forced,
            scope: RefreshScope::Conversations,
        })
        .await?;
        Ok(conversation)
    }
}
