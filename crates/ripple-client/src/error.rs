use ripple_net::{ApiError, PushError};
use ripple_shared::error::NormalizeError;
use ripple_store::StoreError;
use thiserror::Error;

/// Errors returned to callers of [`crate::ClientHandle`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid server payload: {0}")]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("Not logged in")]
    NoSession,

    #[error("Already logged in as {0}")]
    AlreadyLoggedIn(String),

    /// The engine task is gone; every handle is now inert.
    #[error("Client engine stopped")]
    EngineStopped,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_auth())
    }
}
