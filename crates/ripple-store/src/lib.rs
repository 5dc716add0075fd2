//! # ripple-store
//!
//! In-memory entity store for the Ripple client.
//!
//! [`EntityStore`] is the only owner of posts, conversations, stories,
//! notifications and the current user. It performs no I/O. Every write
//! goes through a merge operation that enforces the entity invariants, and
//! every wholesale replacement is gated on a [`RefreshTicket`] so that a
//! late snapshot or one from a previous session can never overwrite newer
//! state.

pub mod conversations;
pub mod notifications;
pub mod posts;
pub mod store;
pub mod stories;
pub mod users;

mod error;

pub use error::{Result, StoreError};
pub use store::{Collection, EntityStore, RefreshTicket};
