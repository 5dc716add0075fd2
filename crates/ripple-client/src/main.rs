//! Headless Ripple client.
//!
//! Logs in with the configured token, keeps the local view in sync and
//! logs every state change until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ripple_client::notify::TracingNotifier;
use ripple_client::push_bridge::WebSocketPush;
use ripple_client::{
    init_tracing, spawn_client, ClientConfig, ClientEvent, Credentials, EngineOptions,
};
use ripple_net::{HttpApi, ServerApi};
use ripple_shared::normalize;
use ripple_shared::types::UserId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting Ripple client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(
        server = %config.server_url,
        push = %config.push_url,
        auto_refresh = config.settings.auto_refresh,
        interval_minutes = config.settings.refresh_interval_minutes,
        "Loaded configuration"
    );
    if config.token.is_empty() {
        anyhow::bail!("RIPPLE_TOKEN is not set");
    }

    let api = Arc::new(
        HttpApi::new(&config.server_url, config.token.clone(), config.request_timeout)
            .context("Failed to build HTTP client")?,
    );

    let credentials = match (config.user_id.clone(), config.username.clone()) {
        (Some(user_id), Some(username)) => Credentials {
            user_id: UserId::new(user_id),
            username,
            token: config.token.clone(),
        },
        _ => {
            let raw = api
                .fetch_current_user()
                .await
                .context("Failed to look up the current user")?;
            let user = normalize::user(raw).context("Server returned an invalid user")?;
            Credentials {
                user_id: user.id,
                username: user.username,
                token: config.token.clone(),
            }
        }
    };

    let push = Arc::new(WebSocketPush {
        url: config.push_url.clone(),
        max_reconnect_attempts: config.max_reconnect_attempts,
        connect_timeout: config.request_timeout,
    });

    let client = spawn_client(
        api,
        Arc::new(TracingNotifier),
        Some(push),
        EngineOptions {
            request_timeout: config.request_timeout,
            settings: config.settings,
        },
    );

    let mut events = client.subscribe();
    client
        .login(credentials)
        .await
        .context("Failed to start session")?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::SessionEnded { reason }) => {
                    warn!(reason = ?reason, "Session ended");
                    break;
                }
                Ok(event) => info!(?event, "Client event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, logging out");
                client.logout().await?;
                break;
            }
        }
    }

    info!("Ripple client stopped");
    Ok(())
}
