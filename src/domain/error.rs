//! Domain-level error types for tg-history-export.
//!
//! All errors are typed with `thiserror`. Upstream protocol failures keep their
//! original cause so the formatted message carries it through to reports.

use std::path::PathBuf;
use thiserror::Error;

use crate::infrastructure::ProtocolError;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required credential or input is missing.
    #[error("{message}")]
    Validation { message: String },

    /// Operation attempted before the session reached the authorized state.
    #[error("client is not authorized")]
    NotAuthorized,

    /// The handle does not resolve to any chat, group, channel or user.
    #[error("chat or channel {handle} was not found or is invalid")]
    ChatNotFound { handle: String },

    /// Entity lookup failed for a reason other than a missing handle.
    #[error("failed to resolve chat {handle}: {source}")]
    ResolutionFailed {
        handle: String,
        #[source]
        source: ProtocolError,
    },

    /// Message iteration failed.
    #[error("failed to fetch messages: {source}")]
    FetchFailed {
        #[source]
        source: ProtocolError,
    },

    /// One of the sign-in steps failed upstream.
    #[error("{stage} failed: {source}")]
    SignInFailed {
        stage: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// A live client is held by an in-flight login.
    #[error("session is in use by an unfinished login, delete it first")]
    SessionBusy,

    /// Failed to read or write the session blob.
    #[error("Session store error: {message}")]
    SessionStore {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Writing the results archive failed.
    #[error("Archive error at {path}: {message}")]
    Archive { path: PathBuf, message: String },
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a session store error from a rusqlite error.
    pub fn session_store(err: rusqlite::Error) -> Self {
        Self::SessionStore {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an archive error.
    pub fn archive(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
