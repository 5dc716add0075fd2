use thiserror::Error;

/// Failure of a single REST operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The call did not complete within the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection refused, reset, DNS failure and the like.
    #[error("Network error: {0}")]
    Network(String),

    /// The session token was rejected.
    #[error("Authentication failed")]
    Unauthorized,

    /// The server answered with an error descriptor.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Authentication failures end the session instead of being retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Failures that the next scheduled refresh may well not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                Self::Unauthorized
            } else {
                Self::Server {
                    status: status.as_u16(),
                    message: e.to_string(),
                }
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Failure on the push socket.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Invalid push URL: {0}")]
    InvalidUrl(String),

    #[error("Token is not a valid header value")]
    InvalidToken,

    #[error("Connect timed out")]
    ConnectTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ApiError::Unauthorized.is_auth());
        assert!(!ApiError::Timeout.is_auth());
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Server {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!ApiError::Server {
            status: 404,
            message: "gone".into()
        }
        .is_transient());
    }
}
