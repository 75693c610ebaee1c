// Typed failures surfaced by every public replica operation.

use strata_common::path::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Path, node or layer absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The authority (or the local snapshot) refuses the change as it stands,
    /// e.g. removing a non-empty layer without `recursive`.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Client-side precondition failure caught before any remote call.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The session credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status.
    #[error("server returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// Response body did not match the expected envelope or payload.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The mutation was accepted but the follow-up reload failed. The last
    /// good snapshot is still cached.
    #[error("operation applied but tree refresh failed: {0}")]
    RefreshFailed(#[source] Box<ClientError>),

    #[error("invalid path: {0}")]
    Path(#[from] PathError),
}

/// Coarse classification used for user messaging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidOperation,
    Network,
    Unauthorized,
    Remote,
    Decode,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidOperation(_) | Self::Path(_) => ErrorKind::InvalidOperation,
            Self::Network(_) => ErrorKind::Network,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Decode(_) => ErrorKind::Decode,
            Self::RefreshFailed(inner) => inner.kind(),
        }
    }

    /// Map an HTTP status and server message to the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            400 | 422 => Self::InvalidOperation(message),
            401 | 403 => Self::Unauthorized(message),
            _ => Self::Remote { status, message },
        }
    }

    pub(crate) fn not_found_path(path: &str) -> Self {
        Self::NotFound(format!("no layer at `{path}`"))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}
