use std::collections::HashSet;

use tracing::debug;

use ripple_shared::models::Post;
use ripple_shared::normalize::PostBatch;
use ripple_shared::types::PostId;

use crate::error::Result;
use crate::store::{Collection, EntityStore, RefreshTicket};

impl EntityStore {
    /// Replace the post arena and feed order with a fetched snapshot.
    ///
    /// Posts pushed after `ticket` was issued and missing from the snapshot
    /// are carried over, since the snapshot could not have seen them.
    pub fn replace_posts(&mut self, ticket: RefreshTicket, batch: PostBatch) -> Result<()> {
        self.admit(ticket, Collection::Posts)?;

        let PostBatch {
            order,
            mut posts,
            skipped,
        } = batch;

        self.pushed_posts.retain(|_, stamp| *stamp >= ticket.seq);

        let mut feed: Vec<PostId> = Vec::with_capacity(order.len());
        for id in &self.feed {
            if self.pushed_posts.contains_key(id) && !posts.contains_key(id) {
                if let Some(post) = self.posts.get(id) {
                    posts.insert(id.clone(), post.clone());
                    feed.push(id.clone());
                }
            }
        }
        let carried = feed.len();

        let mut seen: HashSet<PostId> = feed.iter().cloned().collect();
        for id in order {
            if seen.insert(id.clone()) {
                feed.push(id);
            }
        }

        debug!(
            seq = ticket.seq,
            posts = posts.len(),
            feed = feed.len(),
            carried,
            skipped,
            "Replacing posts"
        );

        self.posts = posts;
        self.feed = feed;
        self.mark_applied(ticket, Collection::Posts);
        Ok(())
    }

    /// Merge a pushed post. Returns `false` when the post is already known.
    ///
    /// The post goes to the head of the feed. Embedded replies or a repost
    /// target replace any older copies by id.
    pub fn insert_pushed_post(&mut self, post_id: &PostId, batch: PostBatch) -> Result<bool> {
        self.require_session()?;
        if self.posts.contains_key(post_id) {
            return Ok(false);
        }

        let parent = batch.posts.get(post_id).and_then(|p| p.parent_id.clone());
        for (id, post) in batch.posts {
            self.posts.insert(id, post);
        }

        if let Some(parent_id) = parent {
            if let Some(parent) = self.posts.get_mut(&parent_id) {
                if !parent.replies.contains(post_id) {
                    parent.replies.push(post_id.clone());
                }
            }
        }

        self.feed.insert(0, post_id.clone());
        self.pushed_posts.insert(post_id.clone(), self.issued_seq);
        Ok(true)
    }

    pub fn contains_post(&self, id: &PostId) -> bool {
        self.posts.contains_key(id)
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id)
    }

    /// Top-level feed ids in order.
    pub fn feed_ids(&self) -> &[PostId] {
        &self.feed
    }

    /// Resolve ids to posts, skipping ids no longer in the arena.
    pub fn posts_by_id<'a>(&self, ids: impl IntoIterator<Item = &'a PostId>) -> Vec<Post> {
        ids.into_iter()
            .filter_map(|id| self.posts.get(id).cloned())
            .collect()
    }

    /// Direct replies of `id` present in the arena.
    pub fn replies_of(&self, id: &PostId) -> Vec<&Post> {
        self.posts
            .get(id)
            .map(|p| p.replies.iter().filter_map(|r| self.posts.get(r)).collect())
            .unwrap_or_default()
    }

    pub fn repost_target(&self, post: &Post) -> Option<&Post> {
        post.repost_of.as_ref().and_then(|id| self.posts.get(id))
    }
}
