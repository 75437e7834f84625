//! Error types shared by the session, transport and API layers.
//!
//! The binary wraps these in `anyhow` at the command boundary; the library
//! modules keep them typed so callers can tell a rejected login from a
//! network outage.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to complete an HTTP exchange at all (no status code was received).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login rejected by the backend (client error status).
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Registration conflict: the email is already taken.
    #[error("an account with that email already exists")]
    DuplicateAccount,

    /// The refresh token was rejected or the refresh round trip failed.
    /// The session has been cleared when this is returned.
    #[error("session refresh failed: {0}")]
    RefreshFailure(String),

    /// Any other network or server failure. The session is untouched.
    #[error("request failed: {0}")]
    TransientFailure(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::TransientFailure(err.to_string())
    }
}

/// Malformed access token payload.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has no payload segment")]
    MissingPayload,

    #[error("token payload is not base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local file persistence failures (token file, pending items).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the typed backend wrappers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The backend answered 2xx but reported an application-level error.
    #[error("{0}")]
    Rejected(String),

    #[error("none of the pending items matched a known material")]
    NothingToSubmit,

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
