// Tab cache store
//
// The in-memory working set of every open tab: document metadata, raw
// text, annotations and scroll offset. Pure data structure owned by the
// session engine; nothing here touches disk, and dropping an entry is
// irreversible, so any durable flush must happen before removal.

use crate::persistence::{DocumentRecord, HighlightRecord, MarginNoteRecord};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lazy-load state for a tab's annotations.
///
/// Explicit tri-state rather than a boolean: `Loading` marks a fetch in
/// flight so a re-entrant activation of the same tab does not start a
/// second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationLoadState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Cached state of one open tab.
#[derive(Debug, Clone)]
pub struct TabCache {
    pub document: Option<DocumentRecord>,
    pub content: String,
    pub file_path: Option<PathBuf>,
    pub highlights: Vec<HighlightRecord>,
    pub margin_notes: Vec<MarginNoteRecord>,
    pub annotations: AnnotationLoadState,
    pub scroll_position: f64,
}

impl TabCache {
    pub fn new() -> Self {
        Self {
            document: None,
            content: String::new(),
            file_path: None,
            highlights: Vec::new(),
            margin_notes: Vec::new(),
            annotations: AnnotationLoadState::NotLoaded,
            scroll_position: 0.0,
        }
    }
}

impl Default for TabCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tab cache entries, keyed by tab id (last write wins).
pub struct TabCacheStore {
    entries: HashMap<String, TabCache>,
}

impl TabCacheStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, tab_id: &str) -> Option<&TabCache> {
        self.entries.get(tab_id)
    }

    pub fn get_mut(&mut self, tab_id: &str) -> Option<&mut TabCache> {
        self.entries.get_mut(tab_id)
    }

    pub fn insert(&mut self, tab_id: &str, cache: TabCache) {
        self.entries.insert(tab_id.to_string(), cache);
    }

    /// Drop a tab's cache. Irreversible.
    pub fn remove(&mut self, tab_id: &str) -> Option<TabCache> {
        self.entries.remove(tab_id)
    }

    pub fn contains(&self, tab_id: &str) -> bool {
        self.entries.contains_key(tab_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TabCacheStore {
    fn default() -> Self {
        Self::new()
    }
}
