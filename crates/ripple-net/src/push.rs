//! Push-event socket with tokio mpsc command/notification channels.
//!
//! The socket runs in its own task. It joins the per-user room after each
//! connect and reconnects automatically, giving up after a bounded number
//! of consecutive failed attempts.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use ripple_shared::constants::DEFAULT_MAX_RECONNECT_ATTEMPTS;
use ripple_shared::protocol::PushFrame;
use ripple_shared::types::UserId;

use crate::error::PushError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the push task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCommand {
    /// Close the socket and stop reconnecting.
    Shutdown,
}

/// Notifications sent *from* the push task.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotification {
    /// Connected and joined the user's room.
    Connected,
    /// The socket dropped; a reconnect follows unless attempts run out.
    Disconnected { reason: String },
    /// A named event frame. Decoding is left to the receiver.
    Frame { event: String, data: Value },
    /// Reconnecting stopped after `attempts` consecutive failures.
    GaveUp { attempts: usize },
}

pub struct PushConfig {
    pub url: String,
    pub token: String,
    pub user_id: UserId,
    pub max_reconnect_attempts: usize,
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt up to 30s.
    pub base_backoff: Duration,
}

impl PushConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>, user_id: UserId) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            user_id,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: Duration::from_secs(10),
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Spawn the push socket in a background tokio task.
///
/// The URL is validated up front; connection failures after that are
/// reported as notifications rather than errors.
pub fn spawn_push_channel(
    config: PushConfig,
) -> Result<(mpsc::Sender<PushCommand>, mpsc::Receiver<PushNotification>), PushError> {
    let parsed = url::Url::parse(&config.url)
        .map_err(|e| PushError::InvalidUrl(format!("{}: {e}", config.url)))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(PushError::InvalidUrl(config.url.clone()));
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<PushCommand>(16);
    let (notif_tx, notif_rx) = mpsc::channel::<PushNotification>(256);

    tokio::spawn(async move {
        let mut attempts: usize = 0;

        loop {
            if attempts >= config.max_reconnect_attempts {
                warn!(attempts, "Push reconnect attempts exhausted, giving up");
                let _ = notif_tx.send(PushNotification::GaveUp { attempts }).await;
                break;
            }
            attempts += 1;
            debug!(url = %config.url, attempt = attempts, "Connecting push socket");

            let connected = tokio::select! {
                cmd = cmd_rx.recv() => {
                    if stop_requested(cmd) {
                        break;
                    }
                    continue;
                }
                result = connect(&config) => result,
            };

            match connected {
                Ok(socket) => {
                    info!(user = %config.user_id, "Push socket connected");
                    attempts = 0;
                    if notif_tx.send(PushNotification::Connected).await.is_err() {
                        break;
                    }
                    match run_session(socket, &mut cmd_rx, &notif_tx).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed(reason) => {
                            warn!(reason = %reason, "Push socket disconnected");
                            let _ = notif_tx
                                .send(PushNotification::Disconnected { reason })
                                .await;
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "Push connect failed, will retry");
                }
            }

            let delay = backoff_delay(config.base_backoff, attempts);
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    if stop_requested(cmd) {
                        break;
                    }
                }
                _ = time::sleep(delay) => {}
            }
        }

        info!("Push task terminated");
    });

    Ok((cmd_tx, notif_rx))
}

fn stop_requested(cmd: Option<PushCommand>) -> bool {
    match cmd {
        Some(PushCommand::Shutdown) => {
            info!("Push shutdown requested");
            true
        }
        None => {
            info!("Command channel closed, shutting down push socket");
            true
        }
    }
}

/// Delay before reconnect attempt `attempt + 1`.
fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16) as u32;
    base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
}

async fn connect(config: &PushConfig) -> Result<Socket, PushError> {
    let mut request = config.url.as_str().into_client_request()?;
    if !config.token.is_empty() {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| PushError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
    }

    let (mut socket, _) = time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| PushError::ConnectTimeout)??;

    let join = PushFrame::join(&config.user_id).to_json()?;
    socket.send(Message::Text(join.into())).await?;
    Ok(socket)
}

enum SessionEnd {
    Shutdown,
    Closed(String),
}

async fn run_session(
    socket: Socket,
    cmd_rx: &mut mpsc::Receiver<PushCommand>,
    notif_tx: &mpsc::Sender<PushNotification>,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if stop_requested(cmd) {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match PushFrame::from_json(&text) {
                        Ok(frame) => {
                            debug!(event = %frame.event, "Push frame received");
                            let notification = PushNotification::Frame {
                                event: frame.event,
                                data: frame.data,
                            };
                            if notif_tx.send(notification).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed push frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Closed(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Closed(e.to_string()),
                    None => return SessionEnd::Closed("stream ended".to_string()),
                }
            }
        }
    }
}
