//! User-initiated operations.
//!
//! Each sub-module groups related operations by domain as methods on
//! [`crate::ClientHandle`]. A successful server mutation is followed by a
//! refresh so the local view converges on the server's state.

pub mod messaging;
pub mod posts;
pub mod profile;
pub mod settings;
