use tracing::debug;

use ripple_shared::models::Notification;
use ripple_shared::types::NotificationId;

use crate::error::{Result, StoreError};
use crate::store::{Collection, EntityStore, RefreshTicket};

impl EntityStore {
    /// Replace the notification list with a fetched snapshot, keeping
    /// notifications pushed after `ticket` was issued.
    pub fn replace_notifications(
        &mut self,
        ticket: RefreshTicket,
        notifications: Vec<Notification>,
    ) -> Result<()> {
        self.admit(ticket, Collection::Notifications)?;

        self.pushed_notifications
            .retain(|_, stamp| *stamp >= ticket.seq);

        let mut merged: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| {
                self.pushed_notifications.contains_key(&n.id)
                    && !notifications.iter().any(|f| f.id == n.id)
            })
            .cloned()
            .collect();
        let carried = merged.len();

        for notification in notifications {
            if !merged.iter().any(|n| n.id == notification.id) {
                merged.push(notification);
            }
        }

        debug!(
            seq = ticket.seq,
            notifications = merged.len(),
            carried,
            "Replacing notifications"
        );

        self.notifications = merged;
        self.mark_applied(ticket, Collection::Notifications);
        Ok(())
    }

    pub fn contains_notification(&self, id: &NotificationId) -> bool {
        self.notifications.iter().any(|n| &n.id == id)
    }

    /// Put a pushed notification at the head of the list. Returns `false`
    /// if it is already known.
    pub fn prepend_notification(&mut self, notification: Notification) -> Result<bool> {
        self.require_session()?;
        if self.contains_notification(&notification.id) {
            return Ok(false);
        }
        self.pushed_notifications
            .insert(notification.id.clone(), self.issued_seq);
        self.notifications.insert(0, notification);
        Ok(true)
    }

    pub fn mark_notification_read(&mut self, id: &NotificationId) -> Result<()> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| StoreError::UnknownNotification(id.clone()))?;
        notification.read = true;
        Ok(())
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_notification_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}
