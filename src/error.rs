//! Error types for the quark_pan crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::TaskResult;

/// Errors that can occur when talking to Quark Drive or reading local state.
#[derive(Error, Debug)]
pub enum QuarkError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    ApiError { code: i64, message: String },

    #[error("Share token rejected: {0}")]
    CapabilityError(String),

    #[error("Task {task_id} stopped: {outcome}")]
    FatalTask { task_id: String, outcome: TaskResult },

    #[error("Task {task_id} did not finish after {attempts} checks")]
    TaskPending { task_id: String, attempts: u32 },

    #[error("Invalid share URL: {0}")]
    InvalidShareUrl(String),

    #[error("Invalid folder URL or ID: {0}")]
    InvalidFolderId(String),

    #[error("Malformed cookie file: {0}")]
    CookieParseError(String),

    #[error("No saved login found, run `quark_pan login` first")]
    MissingCookies,

    #[error("Saved login has expired, run `quark_pan login` again")]
    CookiesExpired,

    #[error("Login rejected by server, run `quark_pan login` again")]
    NotLoggedIn,

    #[error("Malformed state file {}:{line}: {reason}", path.display())]
    StateFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("A folder named \"{0}\" already exists")]
    FolderConflict(String),

    #[error("Save destination folder is not set")]
    MissingDestination,

    #[error("Share is not in your drive, transfer it before downloading")]
    NotOwner,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl QuarkError {
    /// Whether the whole process must stop instead of moving on to the next item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QuarkError::FatalTask { .. })
    }
}

/// Result type alias for QuarkError.
pub type Result<T> = std::result::Result<T, QuarkError>;
