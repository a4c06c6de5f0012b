// Real file-system gateway
//
// Whole-file I/O through tokio::fs plus one notify watcher per watched
// file. Each watcher observes the file's parent directory non-recursively
// and forwards only events whose path matches the watched file exactly
// (a full-path match also covers case-insensitive file systems reporting
// a differently-cased directory entry).

use async_trait::async_trait;
use log::warn;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::error::{io_error_for, GatewayError, GatewayResult};
use super::gateway::{FileChangeEvent, FileSystemGateway, GatewayConfig};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Production gateway over the local file system.
pub struct RealFileSystem {
    events_tx: Sender<FileChangeEvent>,
    /// One watcher per watched file, keyed by the watched path
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
}

impl RealFileSystem {
    /// Create a gateway and the receiving end of its change-event channel.
    pub fn new(config: GatewayConfig) -> (Self, Receiver<FileChangeEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);

        let gateway = Self {
            events_tx,
            watchers: Mutex::new(HashMap::new()),
        };

        (gateway, events_rx)
    }

    fn parent_of(path: &Path) -> GatewayResult<PathBuf> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| GatewayError::InvalidPath(path.to_path_buf()))?;
        Ok(parent.to_path_buf())
    }
}

#[async_trait]
impl FileSystemGateway for RealFileSystem {
    async fn read_file(&self, path: &Path) -> GatewayResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error_for(path, e))
    }

    async fn write_file(&self, path: &Path, content: &str) -> GatewayResult<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| io_error_for(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> GatewayResult<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| io_error_for(from, e))
    }

    fn watch(&self, path: &Path) -> GatewayResult<()> {
        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if watchers.contains_key(path) {
            return Ok(());
        }

        let parent = Self::parent_of(path)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| GatewayError::InvalidPath(path.to_path_buf()))?;
        let target_full = parent.join(file_name);

        let watched_path = path.to_path_buf();
        let tx = self.events_tx.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }

                    // Only forward events that involve our target file
                    if !event.paths.iter().any(|p| *p == target_full) {
                        return;
                    }

                    let change = FileChangeEvent {
                        path: watched_path.clone(),
                        timestamp: now_millis(),
                    };
                    if tx.try_send(change).is_err() {
                        warn!("Folio: change-event channel full, dropping notification");
                    }
                }
                Err(e) => {
                    warn!("Folio: watcher error: {}", e);
                }
            }
        })?;

        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        watchers.insert(path.to_path_buf(), watcher);

        Ok(())
    }

    fn unwatch(&self, path: &Path) -> GatewayResult<()> {
        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut watcher) = watchers.remove(path) {
            if let Ok(parent) = Self::parent_of(path) {
                let _ = watcher.unwatch(&parent);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_write_rename_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _rx) = RealFileSystem::new(GatewayConfig::default());

        let path = dir.path().join("doc.md");
        fs.write_file(&path, "# Title").await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), "# Title");

        let moved = dir.path().join("renamed.md");
        fs.rename(&path, &moved).await.unwrap();
        assert_eq!(fs.read_file(&moved).await.unwrap(), "# Title");
        assert!(matches!(
            fs.read_file(&path).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_reports_external_modification() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, mut rx) = RealFileSystem::new(GatewayConfig::default());

        let path = dir.path().join("watched.md");
        fs.write_file(&path, "before").await.unwrap();
        fs.watch(&path).unwrap();

        // Simulate an external editor touching the file
        std::fs::write(&path, "after").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change event within timeout")
            .expect("channel closed");
        assert_eq!(event.path, path);
        assert!(event.timestamp > 0);
    }

    #[tokio::test]
    async fn test_unrelated_sibling_changes_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, mut rx) = RealFileSystem::new(GatewayConfig::default());

        let watched = dir.path().join("watched.md");
        let sibling = dir.path().join("sibling.md");
        fs.write_file(&watched, "a").await.unwrap();
        fs.watch(&watched).unwrap();

        std::fs::write(&sibling, "noise").unwrap();
        std::fs::write(&watched, "b").unwrap();

        // The first event that arrives must be for the watched file; the
        // sibling write is filtered out inside the watcher callback
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change event within timeout")
            .expect("channel closed");
        assert_eq!(event.path, watched);
    }

    #[tokio::test]
    async fn test_watch_is_idempotent_and_unwatch_tolerates_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _rx) = RealFileSystem::new(GatewayConfig::default());

        let path = dir.path().join("doc.md");
        fs.write_file(&path, "x").await.unwrap();
        fs.watch(&path).unwrap();
        fs.watch(&path).unwrap();

        fs.unwatch(&path).unwrap();
        fs.unwatch(&path).unwrap();
        fs.unwatch(Path::new("/nonexistent/other.md")).unwrap();
    }

    #[tokio::test]
    async fn test_watch_rejects_pathless_target() {
        let (fs, _rx) = RealFileSystem::new(GatewayConfig::default());
        assert!(matches!(
            fs.watch(Path::new("/")),
            Err(GatewayError::InvalidPath(_))
        ));
    }
}
