use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Ripple";

/// Bound on every REST call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default auto-refresh interval in minutes.
pub const DEFAULT_REFRESH_MINUTES: u32 = 5;

/// Smallest auto-refresh interval a user may choose, in minutes.
pub const MIN_REFRESH_MINUTES: u32 = 1;

/// A refresh is deferred while the user interacted within this window.
pub const QUIET_THRESHOLD: Duration = Duration::from_secs(30);

/// How far a deferred refresh is pushed out.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Scheduler tick period.
pub const SCHEDULER_TICK: Duration = Duration::from_secs(1);

/// Deepest reply/repost nesting accepted from the server.
pub const MAX_POST_DEPTH: usize = 32;

/// Default number of push reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: usize = 5;

/// Push event names
pub const EVENT_NEW_NOTIFICATION: &str = "new_notification";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_NEW_POST: &str = "new_post";

/// Event sent after connecting to join the per-user room.
pub const EVENT_JOIN: &str = "join";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
