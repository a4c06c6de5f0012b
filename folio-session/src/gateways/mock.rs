// Mock file-system gateway
//
// In-memory implementation of FileSystemGateway for unit testing.
// Allows tests to seed files, inject write failures, verify call counts
// and hand-deliver change events as if an external editor had touched a
// watched file.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::error::{GatewayError, GatewayResult};
use super::gateway::{FileChangeEvent, FileSystemGateway, GatewayConfig};

/// Mock gateway for testing the session engine without touching disk.
pub struct MockFileSystem {
    /// Path -> content of every "file" the mock knows about
    files: Mutex<HashMap<PathBuf, String>>,

    /// Paths currently being watched
    watched: Mutex<HashSet<PathBuf>>,

    /// Whether the next writes should fail with a permission error
    fail_writes: AtomicBool,

    /// Count of `read_file()` invocations
    read_count: AtomicUsize,

    /// Count of `write_file()` invocations (including failed ones)
    write_count: AtomicUsize,

    events_tx: Sender<FileChangeEvent>,
}

impl MockFileSystem {
    /// Create a mock gateway and the receiving end of its change-event
    /// channel.
    pub fn new(config: GatewayConfig) -> (Self, Receiver<FileChangeEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);

        let mock = Self {
            files: Mutex::new(HashMap::new()),
            watched: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            read_count: AtomicUsize::new(0),
            write_count: AtomicUsize::new(0),
            events_tx,
        };

        (mock, events_rx)
    }

    /// Seed or overwrite a file without counting as a gateway write.
    pub fn set_file(&self, path: &Path, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
    }

    /// Current content of a file, if it exists.
    pub fn file_content(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Make subsequent `write_file()` calls fail with a permission error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Deliver a change event for `path`, as the watcher would after an
    /// external edit.
    pub fn emit_change(&self, path: &Path) {
        let event = FileChangeEvent {
            path: path.to_path_buf(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let _ = self.events_tx.try_send(event);
    }

    /// Get the number of times `read_file()` was invoked.
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Get the number of times `write_file()` was invoked.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Paths currently watched.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl FileSystemGateway for MockFileSystem {
    async fn read_file(&self, path: &Path) -> GatewayResult<String> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(path.to_path_buf()))
    }

    async fn write_file(&self, path: &Path, content: &str) -> GatewayResult<()> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(GatewayError::Denied(path.to_path_buf()));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> GatewayResult<()> {
        let mut files = self.files.lock().unwrap();
        let content = files
            .remove(from)
            .ok_or_else(|| GatewayError::NotFound(from.to_path_buf()))?;
        files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn watch(&self, path: &Path) -> GatewayResult<()> {
        self.watched.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&self, path: &Path) -> GatewayResult<()> {
        self.watched.lock().unwrap().remove(path);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-fs"
    }
}
