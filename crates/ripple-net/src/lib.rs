// Server transport: REST operations and the push-event socket.

pub mod api;
pub mod error;
pub mod http;
pub mod push;

pub use api::{MessageDraft, PostDraft, PostUpdate, ProfileUpdate, ServerApi};
pub use error::{ApiError, PushError};
pub use http::HttpApi;
pub use push::{spawn_push_channel, PushCommand, PushConfig, PushNotification};
