//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start against a local
//! development server with nothing but a token.

use std::time::Duration;

use ripple_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_MAX_RECONNECT_ATTEMPTS, MIN_REFRESH_MINUTES, REQUEST_TIMEOUT,
};
use tracing::warn;

use crate::commands::settings::AppSettings;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `RIPPLE_SERVER_URL`
    /// Default: `http://127.0.0.1:8080`
    pub server_url: String,

    /// Push socket URL.
    /// Env: `RIPPLE_PUSH_URL`
    /// Default: the server URL with a ws scheme, plus `/socket`.
    pub push_url: String,

    /// Session bearer token.
    /// Env: `RIPPLE_TOKEN`
    pub token: String,

    /// Env: `RIPPLE_USER_ID`. Looked up from the server when unset.
    pub user_id: Option<String>,

    /// Env: `RIPPLE_USERNAME`. Looked up from the server when unset.
    pub username: Option<String>,

    /// Initial refresh preferences until the profile says otherwise.
    /// Env: `RIPPLE_AUTO_REFRESH` (true/false), `RIPPLE_REFRESH_MINUTES`
    pub settings: AppSettings,

    /// Bound on every REST call.
    /// Env: `RIPPLE_REQUEST_TIMEOUT_SECS`
    /// Default: 15
    pub request_timeout: Duration,

    /// Push reconnect attempts before giving up.
    /// Env: `RIPPLE_MAX_RECONNECT_ATTEMPTS`
    /// Default: 5
    pub max_reconnect_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let server_url = format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}");
        Self {
            push_url: derive_push_url(&server_url),
            server_url,
            token: String::new(),
            user_id: None,
            username: None,
            settings: AppSettings::default(),
            request_timeout: REQUEST_TIMEOUT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("RIPPLE_SERVER_URL").filter(|u| !u.trim().is_empty()) {
            config.server_url = url.trim().trim_end_matches('/').to_string();
        }

        config.push_url = match lookup("RIPPLE_PUSH_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => url.trim().to_string(),
            None => derive_push_url(&config.server_url),
        };

        if let Some(token) = lookup("RIPPLE_TOKEN") {
            config.token = token;
        }
        config.user_id = lookup("RIPPLE_USER_ID").filter(|v| !v.is_empty());
        config.username = lookup("RIPPLE_USERNAME").filter(|v| !v.is_empty());

        if let Some(value) = lookup("RIPPLE_AUTO_REFRESH") {
            match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => config.settings.auto_refresh = true,
                "false" | "0" | "no" => config.settings.auto_refresh = false,
                _ => warn!(value = %value, "Invalid RIPPLE_AUTO_REFRESH, using default"),
            }
        }

        if let Some(value) = lookup("RIPPLE_REFRESH_MINUTES") {
            match value.parse::<u32>() {
                Ok(minutes) if minutes >= MIN_REFRESH_MINUTES => {
                    config.settings.refresh_interval_minutes = minutes;
                }
                _ => warn!(value = %value, "Invalid RIPPLE_REFRESH_MINUTES, using default"),
            }
        }

        if let Some(value) = lookup("RIPPLE_REQUEST_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => warn!(value = %value, "Invalid RIPPLE_REQUEST_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(value) = lookup("RIPPLE_MAX_RECONNECT_ATTEMPTS") {
            match value.parse::<usize>() {
                Ok(n) => config.max_reconnect_attempts = n,
                Err(_) => warn!(value = %value, "Invalid RIPPLE_MAX_RECONNECT_ATTEMPTS, using default"),
            }
        }

        config
    }
}

fn derive_push_url(server_url: &str) -> String {
    let base = server_url
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{base}/socket")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.server_url, "http://127.0.0.1:8080");
        assert_eq!(config.push_url, "ws://127.0.0.1:8080/socket");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.settings.auto_refresh);
        assert_eq!(config.settings.refresh_interval_minutes, 5);
    }

    #[test]
    fn test_push_url_follows_server_scheme() {
        let config = config(&[("RIPPLE_SERVER_URL", "https://ripple.example/")]);
        assert_eq!(config.server_url, "https://ripple.example");
        assert_eq!(config.push_url, "wss://ripple.example/socket");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[
            ("RIPPLE_REFRESH_MINUTES", "0"),
            ("RIPPLE_REQUEST_TIMEOUT_SECS", "soon"),
            ("RIPPLE_AUTO_REFRESH", "maybe"),
        ]);
        assert_eq!(config.settings.refresh_interval_minutes, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert!(config.settings.auto_refresh);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RIPPLE_TOKEN", "abc"),
            ("RIPPLE_USERNAME", "alice"),
            ("RIPPLE_AUTO_REFRESH", "false"),
            ("RIPPLE_REFRESH_MINUTES", "2"),
            ("RIPPLE_PUSH_URL", "ws://push.local/events"),
        ]);
        assert_eq!(config.token, "abc");
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert!(config.user_id.is_none());
        assert!(!config.settings.auto_refresh);
        assert_eq!(config.settings.refresh_interval_minutes, 2);
        assert_eq!(config.push_url, "ws://push.local/events");
    }
}
