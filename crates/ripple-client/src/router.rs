//! Routes push-channel traffic into the engine.
//!
//! Push events are incremental patches: each one is checked against the
//! store first so a duplicate of something a refresh already delivered
//! changes nothing.

use tracing::{debug, info, warn};

use ripple_net::PushNotification;
use ripple_shared::error::ProtocolError;
use ripple_shared::models::{Message, Notification};
use ripple_shared::normalize::PostBatch;
use ripple_shared::protocol::PushEvent;
use ripple_shared::types::{ConversationId, PostId};

use crate::engine::Engine;
use crate::events::{emit_event, ClientEvent};
use crate::notify::Sound;
use crate::sync::{RefreshReason, RefreshScope};

impl Engine {
    pub(crate) fn handle_push(&mut self, notification: Option<PushNotification>) {
        let Some(notification) = notification else {
            debug!("Push channel closed");
            self.push_rx = None;
            self.push_tx = None;
            return;
        };

        match notification {
            PushNotification::Connected => {
                info!("Push channel connected");
                emit_event(&self.events, ClientEvent::PushConnected);
            }
            PushNotification::Disconnected { reason } => {
                emit_event(&self.events, ClientEvent::PushDisconnected { reason });
            }
            PushNotification::GaveUp { attempts } => {
                warn!(attempts, "Push channel gave up, continuing with refresh only");
                emit_event(&self.events, ClientEvent::PushUnavailable);
            }
            PushNotification::Frame { event, data } => match PushEvent::decode(&event, data) {
                Ok(event) => self.route(event),
                Err(ProtocolError::UnknownEvent(name)) => {
                    debug!(event = %name, "Ignoring unknown push event");
                }
                Err(e) => warn!(event = %event, error = %e, "Dropping malformed push event"),
            },
        }
    }

    pub(crate) fn route(&mut self, event: PushEvent) {
        if self.session.is_none() {
            debug!(event = event.name(), "Push event without a session, ignoring");
            return;
        }
        match event {
            PushEvent::NewNotification(notification) => self.on_new_notification(notification),
            PushEvent::NewMessage {
                conversation_id,
                message,
            } => self.on_new_message(conversation_id, message),
            PushEvent::NewPost { post_id, batch } => self.on_new_post(post_id, batch),
        }
    }

    fn on_new_notification(&mut self, notification: Notification) {
        if self.store.contains_notification(&notification.id) {
            debug!(id = %notification.id, "Known notification, ignoring push");
            return;
        }
        match self.store.prepend_notification(notification.clone()) {
            Ok(true) => {
                self.deliver_if_unseen(&notification);
                self.emit_notifications_updated();
            }
            Ok(false) => {}
            Err(e) => warn!(id = %notification.id, error = %e, "Pushed notification rejected"),
        }
    }

    fn on_new_message(&mut self, conversation_id: ConversationId, message: Message) {
        if self.store.conversation(&conversation_id).is_none() {
            // Never synthesize a conversation from a lone message.
            info!(conversation = %conversation_id, "Message for unknown conversation, refreshing");
            self.refresh(
                RefreshReason::UnknownConversation,
                RefreshScope::Conversations,
            );
            return;
        }

        let from_other = self
            .session
            .as_ref()
            .map_or(false, |s| !s.is_me(&message.sender));
        let message_id = message.id.clone();
        match self.store.append_message(&conversation_id, message) {
            Ok(true) => {
                if from_other {
                    self.notifier.play(Sound::Message);
                }
                self.emit_conversations_updated();
            }
            Ok(false) => debug!(message = %message_id, "Duplicate message ignored"),
            Err(e) => warn!(conversation = %conversation_id, error = %e, "Pushed message rejected"),
        }
    }

    fn on_new_post(&mut self, post_id: PostId, batch: PostBatch) {
        if self.store.contains_post(&post_id) {
            debug!(post = %post_id, "Known post, ignoring push");
            return;
        }
        match self.store.insert_pushed_post(&post_id, batch) {
            Ok(true) => {
                self.feed.admit_direct(&post_id);
                self.emit_posts_updated();
                self.refresh(RefreshReason::NewPost, RefreshScope::All);
            }
            Ok(false) => {}
            Err(e) => warn!(post = %post_id, error = %e, "Pushed post rejected"),
        }
    }
}
