use std::collections::BTreeMap;

use tracing::debug;

use ripple_shared::models::Story;
use ripple_shared::types::UserId;

use crate::error::Result;
use crate::store::{Collection, EntityStore, RefreshTicket};

impl EntityStore {
    /// Merge fetched stories into each owner's tray, by story id.
    ///
    /// Expired stories are kept: expiry is enforced by the server and the
    /// tray renderer, not here.
    pub fn merge_stories(&mut self, ticket: RefreshTicket, stories: Vec<Story>) -> Result<()> {
        self.admit(ticket, Collection::Stories)?;

        let mut grouped: BTreeMap<UserId, Vec<Story>> = BTreeMap::new();
        for story in stories {
            grouped.entry(story.user_id.clone()).or_default().push(story);
        }

        let mut merged = 0usize;
        for (user_id, incoming) in grouped {
            let tray = self.stories.entry(user_id).or_default();
            for story in incoming {
                match tray.iter_mut().find(|s| s.id == story.id) {
                    Some(existing) => *existing = story,
                    None => tray.push(story),
                }
                merged += 1;
            }
            tray.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }

        debug!(seq = ticket.seq, merged, users = self.stories.len(), "Merged stories");
        self.mark_applied(ticket, Collection::Stories);
        Ok(())
    }

    /// Stories grouped per owner, oldest first within a tray.
    pub fn stories(&self) -> &BTreeMap<UserId, Vec<Story>> {
        &self.stories
    }

    pub fn stories_for(&self, user_id: &UserId) -> &[Story] {
        self.stories.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }
}
