//! # ripple-client
//!
//! Client-side sync and notification engine for the Ripple social
//! network.
//!
//! A single engine task owns all client state. It keeps the local view
//! consistent with the server through three paths:
//! - **Full refreshes** fanned out per collection and sequenced so a late
//!   response never overwrites a newer one
//! - **Push events** applied as cheap id-keyed patches
//! - **An adaptive poll scheduler** that holds back while the user is
//!   interacting
//!
//! The presentation layer talks to it through [`ClientHandle`].

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod notify;
pub mod pending;
pub mod push_bridge;
pub mod scheduler;
pub mod session;

mod engine;
mod router;
mod sync;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use engine::{spawn_client, EngineOptions};
pub use error::ClientError;
pub use events::{ClientEvent, SessionEndReason};
pub use handle::{ClientHandle, SchedulerStatus};
pub use session::Credentials;
pub use sync::{RefreshReason, RefreshScope};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ripple_client=debug,ripple_net=debug,ripple_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
