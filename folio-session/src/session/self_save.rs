// Self-save tracker
//
// Records the most recent self-initiated write per file path so the
// session can tell an external edit from the file watcher echoing the
// write it just performed. One record per path, last write wins; expiry
// is evaluated lazily at query time, so no timer runs here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default suppression window in milliseconds. Long enough to absorb
/// watcher latency, short enough that a genuine external edit arriving
/// just after a save is not silently dropped.
pub const DEFAULT_SUPPRESSION_WINDOW_MS: i64 = 1000;

/// Path -> timestamp of the last self-initiated write.
pub struct SelfSaveTracker {
    window_ms: i64,
    last_saves: HashMap<PathBuf, i64>,
}

impl SelfSaveTracker {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last_saves: HashMap::new(),
        }
    }

    /// Normalize away `.` components and redundant separators so the
    /// path the save used and the path the watcher reports compare equal.
    fn normalize(path: &Path) -> PathBuf {
        path.components().collect()
    }

    /// Register a self-initiated write. Overwrites any prior record for
    /// the same path; only the most recent save matters for suppression.
    pub fn record(&mut self, path: &Path, when_ms: i64) {
        self.last_saves.insert(Self::normalize(path), when_ms);
    }

    /// True iff a save to `path` happened within the suppression window
    /// before `now_ms`. Pure: repeated queries return the same answer and
    /// the window does not reset on read.
    pub fn is_within_window(&self, path: &Path, now_ms: i64) -> bool {
        match self.last_saves.get(&Self::normalize(path)) {
            Some(&saved_at) => {
                let elapsed = now_ms - saved_at;
                (0..=self.window_ms).contains(&elapsed)
            }
            None => false,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}
