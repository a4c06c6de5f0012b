// Session error types

use crate::gateways::GatewayError;
use crate::persistence::PersistenceError;
use std::fmt;

/// Errors surfaced by session operations
#[derive(Debug)]
pub enum SessionError {
    /// No tab is active
    NoActiveTab,
    /// The active tab has neither a file path nor a library target
    NoSaveTarget,
    /// The active tab has no document attached
    NoDocument,
    /// Unknown tab id
    TabNotFound(String),
    /// Unknown highlight id
    HighlightNotFound(String),
    /// Unknown margin note id
    MarginNoteNotFound(String),
    /// Reorder index out of range
    InvalidIndex(usize),
    /// File-system gateway failure
    Gateway(GatewayError),
    /// Persistence failure
    Persistence(PersistenceError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveTab => write!(f, "No tab is active"),
            Self::NoSaveTarget => write!(f, "Active tab has no file path or library target"),
            Self::NoDocument => write!(f, "Active tab has no document attached"),
            Self::TabNotFound(id) => write!(f, "Tab not found: {}", id),
            Self::HighlightNotFound(id) => write!(f, "Highlight not found: {}", id),
            Self::MarginNoteNotFound(id) => write!(f, "Margin note not found: {}", id),
            Self::InvalidIndex(index) => write!(f, "Tab index out of range: {}", index),
            Self::Gateway(e) => write!(f, "{}", e),
            Self::Persistence(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

impl From<PersistenceError> for SessionError {
    fn from(err: PersistenceError) -> Self {
        Self::Persistence(err)
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
