//! # ripple-shared
//!
//! Types shared by every Ripple crate: the strict domain model, the
//! tolerant server payload shapes, the single normalization seam between
//! them, and the push-event protocol.

pub mod constants;
pub mod error;
pub mod models;
pub mod normalize;
pub mod protocol;
pub mod types;
pub mod wire;
