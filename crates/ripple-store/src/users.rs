use tracing::debug;

use ripple_shared::models::User;

use crate::error::Result;
use crate::store::{Collection, EntityStore, RefreshTicket};

impl EntityStore {
    /// Replace the current user with a fetched copy, never regressing a
    /// populated field to empty.
    pub fn replace_current_user(&mut self, ticket: RefreshTicket, user: User) -> Result<()> {
        self.admit(ticket, Collection::User)?;
        self.merge_current_user(user);
        self.mark_applied(ticket, Collection::User);
        Ok(())
    }

    /// Merge a user returned by a profile mutation or the login response.
    pub fn merge_current_user(&mut self, user: User) {
        let merged = match self.current_user.take() {
            Some(previous) => user.preserving_populated(&previous),
            None => user,
        };
        debug!(user = %merged.username, "Current user updated");
        self.current_user = Some(merged);
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_shared::types::{SessionId, UserId};

    fn user(avatar: Option<&str>, bio: Option<&str>) -> User {
        User {
            id: UserId::new("u1"),
            username: "alice".into(),
            display_name: None,
            bio: bio.map(String::from),
            avatar_url: avatar.map(String::from),
            cover_url: None,
            followers: vec![],
            following: vec![],
            preferences: None,
        }
    }

    #[test]
    fn test_partial_response_keeps_avatar() {
        let mut store = EntityStore::new();
        store.start_session(SessionId::new());

        let t1 = store.begin_refresh().unwrap();
        store
            .replace_current_user(t1, user(Some("https://cdn/a.png"), Some("old bio")))
            .unwrap();
        let t2 = store.begin_refresh().unwrap();
        store.replace_current_user(t2, user(None, Some("new bio"))).unwrap();

        let current = store.current_user().unwrap();
        assert_eq!(current.avatar_url.as_deref(), Some("https://cdn/a.png"));
        assert_eq!(current.bio.as_deref(), Some("new bio"));
    }

    #[test]
    fn test_logout_clears_user() {
        let mut store = EntityStore::new();
        store.start_session(SessionId::new());
        store.merge_current_user(user(None, None));
        store.end_session();
        assert!(store.current_user().is_none());
    }
}
