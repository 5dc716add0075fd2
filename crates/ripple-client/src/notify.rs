//! Notification dedup and delivery.
//!
//! Delivery is gated solely by the session's [`SeenNotifications`] set, so
//! a notification reaching the client through any mix of refreshes and
//! push events is alerted at most once.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use ripple_shared::constants::APP_NAME;
use ripple_shared::models::{Notification, NotificationKind, Post};
use ripple_shared::types::NotificationId;

const PREVIEW_CHARS: usize = 80;

/// Sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sound {
    Reply,
    Reaction,
    Follow,
    Message,
    Generic,
}

impl Sound {
    pub fn for_kind(kind: &NotificationKind) -> Self {
        match kind {
            NotificationKind::Reply => Self::Reply,
            NotificationKind::Reaction => Self::Reaction,
            NotificationKind::Follow => Self::Follow,
            _ => Self::Generic,
        }
    }
}

/// Whether the host lets us show OS-level alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// An OS-level alert. `tag` lets the OS coalesce repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub tag: String,
    pub title: String,
    pub body: String,
}

/// Host notification facilities.
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;
    fn show(&self, alert: &Alert) -> Result<(), String>;
    fn play(&self, sound: Sound);
}

/// Logs alerts instead of rendering them. Used by the headless binary.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, alert: &Alert) -> Result<(), String> {
        info!(tag = %alert.tag, title = %alert.title, body = %alert.body, "Alert");
        Ok(())
    }

    fn play(&self, sound: Sound) {
        debug!(sound = ?sound, "Sound cue");
    }
}

/// Notification ids already surfaced this session. Append-only.
#[derive(Debug, Default)]
pub struct SeenNotifications {
    ids: HashSet<NotificationId>,
}

impl SeenNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` if the id was not seen before.
    pub fn insert(&mut self, id: NotificationId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    AlreadySeen,
    Alerted,
    /// Permission denied or the alert failed; only the sound played.
    SoundOnly,
}

/// Surface `notification` unless its id was already seen, then mark it seen.
pub fn deliver(
    notifier: &dyn Notifier,
    seen: &mut SeenNotifications,
    notification: &Notification,
    related: Option<&Post>,
) -> Delivery {
    if !seen.insert(notification.id.clone()) {
        return Delivery::AlreadySeen;
    }

    let sound = Sound::for_kind(&notification.kind);
    let outcome = match notifier.permission() {
        Permission::Granted => {
            let alert = Alert {
                tag: notification.id.to_string(),
                title: APP_NAME.to_string(),
                body: describe(notification, related),
            };
            match notifier.show(&alert) {
                Ok(()) => Delivery::Alerted,
                Err(e) => {
                    warn!(id = %notification.id, error = %e, "Alert failed, sound only");
                    Delivery::SoundOnly
                }
            }
        }
        Permission::Denied => {
            debug!(id = %notification.id, "Notification permission denied, sound only");
            Delivery::SoundOnly
        }
    };
    notifier.play(sound);
    outcome
}

/// Human-readable alert text.
pub fn describe(notification: &Notification, related: Option<&Post>) -> String {
    let actor = notification.actor.label();
    let action = match &notification.kind {
        NotificationKind::Reply => "replied to your post",
        NotificationKind::Reaction => "reacted to your post",
        NotificationKind::Follow => "started following you",
        NotificationKind::Mention => "mentioned you",
        NotificationKind::Repost => "reposted your post",
        NotificationKind::DirectMessage => "sent you a message",
        NotificationKind::Unknown(_) => return "You have a new notification".to_string(),
    };

    match related.map(|p| preview(&p.content)).filter(|p| !p.is_empty()) {
        Some(snippet) => format!("{actor} {action}: \"{snippet}\""),
        None => format!("{actor} {action}"),
    }
}

fn preview(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
