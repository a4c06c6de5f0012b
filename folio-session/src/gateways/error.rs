// File-system gateway error types
//
// Designed for error isolation: a failed read or write surfaces to the
// session as a recoverable error, never as a crash.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that can occur at the file-system boundary
#[derive(Debug)]
pub enum GatewayError {
    /// File does not exist
    NotFound(PathBuf),

    /// Permission denied by the operating system
    Denied(PathBuf),

    /// Setting up or tearing down a watch failed
    WatchFailed(String),

    /// Watched path has no parent directory or file name
    InvalidPath(PathBuf),

    /// Change-notification channel closed unexpectedly
    ChannelClosed,

    /// Any other I/O error
    IoError(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "File not found: {}", path.display()),
            Self::Denied(path) => write!(f, "Permission denied: {}", path.display()),
            Self::WatchFailed(msg) => write!(f, "File watch failed: {}", msg),
            Self::InvalidPath(path) => {
                write!(f, "Path has no parent or file name: {}", path.display())
            }
            Self::ChannelClosed => write!(f, "Change-notification channel closed unexpectedly"),
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<notify::Error> for GatewayError {
    fn from(err: notify::Error) -> Self {
        Self::WatchFailed(err.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Map an io::Error for a known path to the closest gateway variant.
pub(crate) fn io_error_for(path: &std::path::Path, err: io::Error) -> GatewayError {
    match err.kind() {
        io::ErrorKind::NotFound => GatewayError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => GatewayError::Denied(path.to_path_buf()),
        _ => GatewayError::IoError(err.to_string()),
    }
}
