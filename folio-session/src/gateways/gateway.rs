// File-system gateway trait
//
// Defines the narrow interface the session engine uses to touch the file
// system: whole-file reads and writes, renames, and per-file change
// watching. Implementations deliver change notifications through the
// bounded channel handed out at construction time.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::GatewayResult;

/// A change observed on a watched file.
///
/// The watcher cannot tell an external edit from an echo of the session's
/// own write; the session engine filters these through its self-save
/// tracker before acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    /// Milliseconds since epoch at observation time
    pub timestamp: i64,
}

/// Interface to the file system as the session engine sees it.
///
/// Reads and writes are whole-file: documents are small enough that
/// streaming buys nothing, and a single write keeps the change
/// notification for it to one burst.
#[async_trait]
pub trait FileSystemGateway: Send + Sync {
    /// Read a file's entire content as UTF-8.
    async fn read_file(&self, path: &Path) -> GatewayResult<String>;

    /// Replace a file's entire content.
    async fn write_file(&self, path: &Path, content: &str) -> GatewayResult<()>;

    /// Move a file to a new path.
    async fn rename(&self, from: &Path, to: &Path) -> GatewayResult<()>;

    /// Start watching a single file for changes. Watching an
    /// already-watched path is a no-op.
    fn watch(&self, path: &Path) -> GatewayResult<()>;

    /// Stop watching a file. Unwatching a path that is not watched is a
    /// no-op.
    fn unwatch(&self, path: &Path) -> GatewayResult<()>;

    /// Get the name of this gateway for logging and error messages.
    fn name(&self) -> &str;
}

/// Configuration for gateway behavior
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Capacity of the change-event channel (bounded to prevent memory
    /// growth; a slow consumer drops events rather than ballooning)
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.channel_capacity, 100);
    }
}
