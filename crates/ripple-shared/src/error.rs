use thiserror::Error;

/// A server payload could not be turned into a strict domain value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Missing required field `{field}` on {entity}")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Post nesting exceeds {0} levels")]
    TooDeep(usize),
}

impl NormalizeError {
    pub fn missing(entity: &'static str, field: &'static str) -> Self {
        Self::MissingField { entity, field }
    }
}

/// A push event could not be decoded.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown push event: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {event} payload: {source}")]
    Invalid {
        event: &'static str,
        #[source]
        source: NormalizeError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
