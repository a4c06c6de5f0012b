// Folio Toast System
//
// Transient notification payloads shown while a staged action is pending
// (an undoable edit, a failed save). The toast itself is inert data; the
// timer and the commit/undo lifecycle live in the session crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What kind of staged action a toast announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastKind {
    /// Informational error (red border, ✗ icon); dismiss only.
    Error,
    /// Undoable edit (blue border, ↩ icon); offers an undo affordance.
    Undo,
}

impl ToastKind {
    /// How long a toast of this kind stays on screen before the staged
    /// action auto-commits. Errors are dismissible noise and go away
    /// sooner; undo toasts leave time to react.
    pub fn default_duration(&self) -> Duration {
        match self {
            ToastKind::Error => Duration::from_secs(4),
            ToastKind::Undo => Duration::from_secs(8),
        }
    }

    /// Get ANSI color code for this kind.
    pub fn color_code(&self) -> &'static str {
        match self {
            ToastKind::Error => "\x1b[31m", // Red
            ToastKind::Undo => "\x1b[34m",  // Blue
        }
    }

    /// Get icon character for this kind.
    pub fn icon(&self) -> &'static str {
        match self {
            ToastKind::Error => "✗",
            ToastKind::Undo => "↩",
        }
    }
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToastKind::Error => write!(f, "error"),
            ToastKind::Undo => write!(f, "undo"),
        }
    }
}

/// Toast with kind and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    /// Timestamp when the toast was created (milliseconds since epoch)
    pub timestamp: u64,
}

impl Toast {
    pub fn new(kind: ToastKind, message: String) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            kind,
            message,
            timestamp,
        }
    }

    /// Create an error toast
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message.into())
    }

    /// Create an undo toast
    pub fn undo(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Undo, message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_creation() {
        let toast = Toast::error("Save failed");
        assert_eq!(toast.kind, ToastKind::Error);
        assert_eq!(toast.message, "Save failed");
        assert!(toast.timestamp > 0);
    }

    #[test]
    fn test_error_is_shorter_than_undo() {
        assert!(ToastKind::Error.default_duration() < ToastKind::Undo.default_duration());
    }

    #[test]
    fn test_toast_kind_display() {
        assert_eq!(ToastKind::Error.to_string(), "error");
        assert_eq!(ToastKind::Undo.to_string(), "undo");
    }
}
