//! Pending post buffer between refresh results and the rendered feed.
//!
//! Posts discovered by a refresh are held back until the user accepts
//! them; posts that disappear from the feed leave the view immediately.

use std::collections::HashSet;

use ripple_shared::types::PostId;

/// What a reconcile changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub buffered: usize,
    pub admitted: usize,
    pub dropped: usize,
}

/// The rendered feed and its pending set.
#[derive(Debug, Default)]
pub struct FeedView {
    rendered: Vec<PostId>,
    pending: Vec<PostId>,
    seeded: bool,
}

impl FeedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff the authoritative feed order against the rendered set.
    ///
    /// The first reconcile of a session renders everything. After that,
    /// unseen ids go to the head of the pending set unless `direct` says
    /// they may be shown at once (e.g. the user's own posts).
    pub fn reconcile(&mut self, feed: &[PostId], direct: impl Fn(&PostId) -> bool) -> Reconciled {
        if !self.seeded {
            self.seeded = true;
            self.rendered = feed.to_vec();
            return Reconciled {
                admitted: self.rendered.len(),
                ..Reconciled::default()
            };
        }

        let current: HashSet<&PostId> = feed.iter().collect();
        let before = self.rendered.len();
        self.rendered.retain(|id| current.contains(id));
        self.pending.retain(|id| current.contains(id));
        let dropped = before - self.rendered.len();

        let known: HashSet<PostId> = self
            .rendered
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect();

        let mut admitted = Vec::new();
        let mut buffered = Vec::new();
        for id in feed.iter().filter(|id| !known.contains(*id)) {
            if direct(id) {
                admitted.push(id.clone());
            } else {
                buffered.push(id.clone());
            }
        }

        let outcome = Reconciled {
            buffered: buffered.len(),
            admitted: admitted.len(),
            dropped,
        };
        if !admitted.is_empty() {
            admitted.append(&mut self.rendered);
            self.rendered = admitted;
        }
        if !buffered.is_empty() {
            buffered.append(&mut self.pending);
            self.pending = buffered;
        }
        outcome
    }

    /// Show a post immediately, e.g. one delivered by push.
    pub fn admit_direct(&mut self, id: &PostId) {
        self.pending.retain(|p| p != id);
        if !self.rendered.contains(id) {
            self.rendered.insert(0, id.clone());
        }
    }

    /// Move the pending set to the head of the rendered feed.
    pub fn accept_pending(&mut self) -> usize {
        let accepted = self.pending.len();
        if accepted > 0 {
            let mut merged = std::mem::take(&mut self.pending);
            merged.append(&mut self.rendered);
            self.rendered = merged;
        }
        accepted
    }

    pub fn rendered(&self) -> &[PostId] {
        &self.rendered
    }

    pub fn pending(&self) -> &[PostId] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.rendered.clear();
        self.pending.clear();
        self.seeded = false;
    }
}
