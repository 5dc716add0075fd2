//! Opens the push channel for a session.

use std::time::Duration;

use tokio::sync::mpsc;

use ripple_net::{spawn_push_channel, PushCommand, PushConfig, PushError, PushNotification};

use crate::session::Credentials;

pub type PushChannel = (mpsc::Sender<PushCommand>, mpsc::Receiver<PushNotification>);

/// Connects a session to its push-event source.
pub trait PushConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<PushChannel, PushError>;
}

/// The websocket push channel from `ripple-net`.
#[derive(Debug, Clone)]
pub struct WebSocketPush {
    pub url: String,
    pub max_reconnect_attempts: usize,
    pub connect_timeout: Duration,
}

impl PushConnector for WebSocketPush {
    fn connect(&self, credentials: &Credentials) -> Result<PushChannel, PushError> {
        let config = PushConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: self.connect_timeout,
            ..PushConfig::new(
                self.url.clone(),
                credentials.token.clone(),
                credentials.user_id.clone(),
            )
        };
        spawn_push_channel(config)
    }
}
