//! Stable error taxonomy shared by the engine, the REST layer and the gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error kind. Serialized into HTTP bodies and gateway
/// `error` events, so the string forms must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Conflict,
    InvalidRequest,
    NotAuthorized,
    NotFound,
    TransientStore,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::InvalidRequest => "invalid_request",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound => "not_found",
            Self::TransientStore => "transient_store",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Duplicate interest, or a match that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller is not a participant of the target match or message.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Store or cache unavailable. Retried by the caller before surfacing.
    #[error("store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::NotAuthorized(_) => ErrorKind::NotAuthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TransientStore(_) => ErrorKind::TransientStore,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
