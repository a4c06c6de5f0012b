// Document session engine
//
// Orchestrates the tab lifecycle, the per-tab cache, saves, and the
// suppression of file-change notifications that are echoes of the
// session's own writes. The engine is constructed explicitly and owned
// by a single driver task; its operations serialize through that owner,
// which is what makes snapshot-at-call saves and mutate-then-await
// ordering sufficient without locks.

use crate::gateways::{FileChangeEvent, FileSystemGateway};
use crate::persistence::{
    DocumentRecord, HighlightRecord, MarginNoteRecord, PersistenceError, PersistenceManager,
    TabRecord,
};
use crate::session::error::{SessionError, SessionResult};
use crate::session::self_save::{SelfSaveTracker, DEFAULT_SUPPRESSION_WINDOW_MS};
use crate::session::tab_cache::{AnnotationLoadState, TabCache, TabCacheStore};
use crate::staged::{StagedAction, StagedActionSlot};
use folio_utils::data::{DocumentSource, HighlightColor};
use folio_utils::toast::Toast;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use uuid::Uuid;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long after a save the watcher's echo of that write is ignored
    pub suppression_window_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            suppression_window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
        }
    }
}

/// One open tab. `order` values are dense and pairwise distinct at every
/// observable point; all renumbering happens in one pass before any
/// suspension.
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: String,
    pub document_id: Option<String>,
    pub title: String,
    pub is_dirty: bool,
    pub order: i64,
    pub created_at: i64,
}

impl Tab {
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// Ask the engine owner to put an undone highlight (and its notes) back
/// into the owning tab's cache. Sent by the undo effect of a staged
/// deletion; the durable row was never deleted, only the cache entry.
pub struct RestoreRequest {
    pub highlight: HighlightRecord,
    pub notes: Vec<MarginNoteRecord>,
}

enum SaveTarget {
    File(PathBuf),
    Library(DocumentRecord),
}

fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

fn wall_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn title_for_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The document session: tab list, cache, self-save tracker and staged
/// actions, wired to the file-system gateway and the persistence layer.
pub struct SessionEngine {
    tabs: Vec<Tab>,
    active_tab: Option<String>,
    cache: TabCacheStore,
    self_saves: SelfSaveTracker,
    slot: StagedActionSlot,
    fs: Arc<dyn FileSystemGateway>,
    persistence: Arc<PersistenceManager>,
    restore_tx: UnboundedSender<RestoreRequest>,
    /// Monotonic engine clock; drives the suppression window so tests
    /// can run it under virtual time
    started_at: Instant,
}

impl SessionEngine {
    /// Create an engine and the receiving end of its undo-restore
    /// channel. The caller drains the receiver in its event loop and
    /// feeds each request to [`SessionEngine::apply_restore`].
    pub fn new(
        fs: Arc<dyn FileSystemGateway>,
        persistence: Arc<PersistenceManager>,
        config: SessionConfig,
    ) -> (Self, UnboundedReceiver<RestoreRequest>) {
        let (restore_tx, restore_rx) = mpsc::unbounded_channel();

        let engine = Self {
            tabs: Vec::new(),
            active_tab: None,
            cache: TabCacheStore::new(),
            self_saves: SelfSaveTracker::new(config.suppression_window_ms),
            slot: StagedActionSlot::new(),
            fs,
            persistence,
            restore_tx,
            started_at: Instant::now(),
        };

        (engine, restore_rx)
    }

    fn now_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    /// Tabs in display order.
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_tab_id(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    /// Read-only view of one tab's cache for the presentation layer.
    pub fn tab_cache(&self, tab_id: &str) -> Option<&TabCache> {
        self.cache.get(tab_id)
    }

    /// The toast for the currently staged action, if any.
    pub fn staged_toast(&self) -> Option<Toast> {
        self.slot.current()
    }

    /// Undo the staged action, if one is pending.
    pub fn request_undo(&self) -> bool {
        self.slot.request_undo()
    }

    /// Dismiss the staged action, committing it now.
    pub fn request_commit(&self) -> bool {
        self.slot.request_commit()
    }

    fn position(&self, tab_id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == tab_id)
    }

    fn tab_for_path(&self, path: &Path) -> Option<String> {
        self.tabs
            .iter()
            .map(|t| t.id.clone())
            .find(|id| {
                self.cache
                    .get(id)
                    .and_then(|c| c.file_path.as_deref())
                    .map_or(false, |p| p == path)
            })
    }

    fn tab_for_document(&self, document_id: &str) -> Option<String> {
        self.tabs.iter().map(|t| t.id.clone()).find(|id| {
            self.cache
                .get(id)
                .and_then(|c| c.document.as_ref())
                .map_or(false, |d| d.id == document_id)
        })
    }

    /// Queue the whole tab layout for durable storage.
    fn persist_layout(&self) {
        let records: Vec<TabRecord> = self
            .tabs
            .iter()
            .filter_map(|t| {
                let document_id = t.document_id.clone()?;
                Some(TabRecord {
                    id: t.id.clone(),
                    document_id,
                    tab_order: t.order,
                    is_active: self.active_tab.as_deref() == Some(t.id.as_str()),
                    created_at: t.created_at,
                })
            })
            .collect();

        if let Err(e) = self.persistence.replace_tabs(records) {
            warn!("Folio: failed to queue tab layout write: {}", e);
        }
    }

    /// Open a file in a new tab, or switch to the tab that already has it.
    pub async fn open_file(&mut self, path: &Path) -> SessionResult<String> {
        if let Some(existing) = self.tab_for_path(path) {
            self.set_active_tab(&existing).await?;
            return Ok(existing);
        }

        let content = self.fs.read_file(path).await?;
        let now = wall_millis();
        let path_str = path.to_string_lossy().to_string();

        let known = match self.persistence.get_document_by_path(&path_str).await {
            Ok(doc) => doc,
            Err(PersistenceError::DatabaseUnavailable(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let document = match known {
            Some(mut doc) => {
                doc.last_opened_at = now;
                doc.word_count = count_words(&content);
                self.persistence.upsert_document(doc).await?
            }
            None => {
                let doc = DocumentRecord {
                    id: Uuid::new_v4().to_string(),
                    source: DocumentSource::File.as_str().to_string(),
                    file_path: Some(path_str),
                    library_id: None,
                    title: Some(title_for_path(path)),
                    author: None,
                    url: None,
                    word_count: count_words(&content),
                    last_opened_at: now,
                    created_at: now,
                };
                self.persistence.upsert_document(doc).await?
            }
        };

        let tab_id = self.install_tab(document, content, Some(path.to_path_buf()), now);
        self.set_active_tab(&tab_id).await?;

        if let Err(e) = self.fs.watch(path) {
            warn!("Folio: could not watch {}: {}", path.display(), e);
        }

        info!("Folio: opened {} in tab {}", path.display(), tab_id);
        Ok(tab_id)
    }

    /// Open a library-backed document in a new tab, or switch to the tab
    /// that already has it. Library documents have no file path and are
    /// saved through the persistence layer instead of the file system.
    pub async fn open_library_document(
        &mut self,
        library_id: &str,
        title: Option<String>,
        content: String,
    ) -> SessionResult<String> {
        let existing = self.tabs.iter().map(|t| t.id.clone()).find(|id| {
            self.cache
                .get(id)
                .and_then(|c| c.document.as_ref())
                .and_then(|d| d.library_id.as_deref())
                == Some(library_id)
        });
        if let Some(existing) = existing {
            self.set_active_tab(&existing).await?;
            return Ok(existing);
        }

        let now = wall_millis();
        let known = match self.persistence.get_document_by_library_id(library_id).await {
            Ok(doc) => doc,
            Err(PersistenceError::DatabaseUnavailable(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let document = match known {
            Some(mut doc) => {
                doc.last_opened_at = now;
                doc.word_count = count_words(&content);
                self.persistence.upsert_document(doc).await?
            }
            None => {
                let doc = DocumentRecord {
                    id: Uuid::new_v4().to_string(),
                    source: DocumentSource::Library.as_str().to_string(),
                    file_path: None,
                    library_id: Some(library_id.to_string()),
                    title,
                    author: None,
                    url: None,
                    word_count: count_words(&content),
                    last_opened_at: now,
                    created_at: now,
                };
                self.persistence.upsert_document(doc).await?
            }
        };

        let tab_id = self.install_tab(document, content, None, now);
        self.set_active_tab(&tab_id).await?;

        info!("Folio: opened library item {} in tab {}", library_id, tab_id);
        Ok(tab_id)
    }

    fn install_tab(
        &mut self,
        document: DocumentRecord,
        content: String,
        file_path: Option<PathBuf>,
        now: i64,
    ) -> String {
        let tab_id = Uuid::new_v4().to_string();
        let title = document.title.clone().unwrap_or_default();

        self.tabs.push(Tab {
            id: tab_id.clone(),
            document_id: Some(document.id.clone()),
            title,
            is_dirty: false,
            order: self.tabs.len() as i64,
            created_at: now,
        });

        let mut cache = TabCache::new();
        cache.content = content;
        cache.file_path = file_path;
        cache.document = Some(document);
        self.cache.insert(&tab_id, cache);

        self.persist_layout();
        tab_id
    }

    /// Install a document and its content into the active tab's cache
    /// without performing any I/O; used when the state was already
    /// materialized (prior session, cache hit). Leaves the self-save
    /// tracker alone.
    pub fn restore_from_cache(
        &mut self,
        document: DocumentRecord,
        content: String,
        file_path: Option<PathBuf>,
        is_dirty: bool,
    ) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;

        let idx = self
            .position(&tab_id)
            .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;
        self.tabs[idx].document_id = Some(document.id.clone());
        if let Some(title) = &document.title {
            self.tabs[idx].title = title.clone();
        }
        self.tabs[idx].is_dirty = is_dirty;

        let mut cache = TabCache::new();
        cache.content = content;
        cache.file_path = file_path;
        cache.document = Some(document);
        self.cache.insert(&tab_id, cache);

        Ok(())
    }

    /// Make a tab active, persist the flag, and lazily load its
    /// annotations on first activation.
    pub async fn set_active_tab(&mut self, tab_id: &str) -> SessionResult<()> {
        if self.position(tab_id).is_none() {
            return Err(SessionError::TabNotFound(tab_id.to_string()));
        }

        self.active_tab = Some(tab_id.to_string());
        if let Err(e) = self.persistence.set_active_tab(tab_id) {
            warn!("Folio: failed to queue active-tab write: {}", e);
        }

        self.load_annotations(tab_id).await
    }

    /// Fetch highlights and margin notes for a tab the first time it is
    /// activated. The cache's tri-state flag guards re-entrant
    /// activations while a fetch is in flight.
    async fn load_annotations(&mut self, tab_id: &str) -> SessionResult<()> {
        let document_id = {
            let Some(cache) = self.cache.get_mut(tab_id) else {
                return Ok(());
            };
            if cache.annotations != AnnotationLoadState::NotLoaded {
                return Ok(());
            }
            let Some(document) = cache.document.as_ref() else {
                cache.annotations = AnnotationLoadState::Loaded;
                return Ok(());
            };
            cache.annotations = AnnotationLoadState::Loading;
            document.id.clone()
        };

        let highlights = self.persistence.fetch_highlights(&document_id).await;
        let notes = self.persistence.fetch_margin_notes(&document_id).await;

        // The tab may have been closed while the fetch was in flight
        let Some(cache) = self.cache.get_mut(tab_id) else {
            return Ok(());
        };

        match (highlights, notes) {
            (Ok(highlights), Ok(notes)) => {
                cache.highlights = highlights;
                cache.margin_notes = notes;
                cache.annotations = AnnotationLoadState::Loaded;
                Ok(())
            }
            (Err(PersistenceError::DatabaseUnavailable(_)), _)
            | (_, Err(PersistenceError::DatabaseUnavailable(_))) => {
                debug!("Folio: annotations unavailable without a database");
                cache.annotations = AnnotationLoadState::Loaded;
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                cache.annotations = AnnotationLoadState::NotLoaded;
                Err(e.into())
            }
        }
    }

    /// Close a tab: discard its cache, persist the removal, stop
    /// watching its file if no other tab shares it, and promote an
    /// adjacent tab if the closed one was active.
    pub async fn close_tab(&mut self, tab_id: &str) -> SessionResult<()> {
        let idx = self
            .position(tab_id)
            .ok_or_else(|| SessionError::TabNotFound(tab_id.to_string()))?;

        self.tabs.remove(idx);
        let removed_cache = self.cache.remove(tab_id);

        // Renumber densely in one pass before anything can observe the set
        for (i, tab) in self.tabs.iter_mut().enumerate() {
            tab.order = i as i64;
        }

        if let Some(path) = removed_cache.and_then(|c| c.file_path) {
            let still_open = self.tabs.iter().any(|t| {
                self.cache
                    .get(&t.id)
                    .and_then(|c| c.file_path.as_deref())
                    .map_or(false, |p| p == path.as_path())
            });
            if !still_open {
                let _ = self.fs.unwatch(&path);
            }
        }

        if self.active_tab.as_deref() == Some(tab_id) {
            self.active_tab = None;
            let promoted = if self.tabs.is_empty() {
                None
            } else {
                Some(self.tabs[idx.min(self.tabs.len() - 1)].id.clone())
            };
            self.persist_layout();
            if let Some(next) = promoted {
                self.set_active_tab(&next).await?;
            }
        } else {
            self.persist_layout();
        }

        info!("Folio: closed tab {}", tab_id);
        Ok(())
    }

    /// Move a tab from one display position to another. Synchronous and
    /// allocation-local: every order value is recomputed before the
    /// method returns, so no observer can see duplicates.
    pub fn reorder_tabs(&mut self, from: usize, to: usize) -> SessionResult<()> {
        if from >= self.tabs.len() {
            return Err(SessionError::InvalidIndex(from));
        }
        if to >= self.tabs.len() {
            return Err(SessionError::InvalidIndex(to));
        }

        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        for (i, tab) in self.tabs.iter_mut().enumerate() {
            tab.order = i as i64;
        }

        self.persist_layout();
        Ok(())
    }

    /// Replace the active tab's buffer; marks it dirty only on actual
    /// change.
    pub fn update_content(&mut self, content: String) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;

        let changed = {
            let cache = self
                .cache
                .get_mut(&tab_id)
                .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;
            if cache.content == content {
                false
            } else {
                cache.content = content;
                true
            }
        };

        if changed {
            if let Some(idx) = self.position(&tab_id) {
                self.tabs[idx].is_dirty = true;
            }
        }
        Ok(())
    }

    /// Remember the active tab's scroll offset. Scroll does not dirty
    /// the document.
    pub fn update_scroll(&mut self, offset: f64) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let cache = self
            .cache
            .get_mut(&tab_id)
            .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;
        cache.scroll_position = offset;
        Ok(())
    }

    /// Save the active tab. Returns Ok(false) when the tab is clean and
    /// there is nothing to write (which is also how a save issued behind
    /// an in-flight one coalesces: it runs after it and finds the tab
    /// clean).
    ///
    /// The content is snapshotted at call time; edits arriving while the
    /// write is suspended are never half-written, and they keep the tab
    /// dirty. On success the write is registered with the self-save
    /// tracker so the watcher's echo of it is ignored. On failure the
    /// dirty flag stays set, nothing is registered, and an error toast
    /// is staged.
    pub async fn save_current_file(&mut self) -> SessionResult<bool> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let idx = self
            .position(&tab_id)
            .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;

        if !self.tabs[idx].is_dirty {
            return Ok(false);
        }

        let (snapshot, target) = {
            let cache = self
                .cache
                .get(&tab_id)
                .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;
            let target = if let Some(path) = &cache.file_path {
                SaveTarget::File(path.clone())
            } else if let Some(doc) = &cache.document {
                if doc.library_id.is_some() {
                    SaveTarget::Library(doc.clone())
                } else {
                    return Err(SessionError::NoSaveTarget);
                }
            } else {
                return Err(SessionError::NoSaveTarget);
            };
            (cache.content.clone(), target)
        };

        let document_id = self.tabs[idx].document_id.clone();

        let result = match &target {
            SaveTarget::File(path) => self
                .fs
                .write_file(path, &snapshot)
                .await
                .map_err(SessionError::from),
            SaveTarget::Library(doc) => {
                let mut updated = doc.clone();
                updated.word_count = count_words(&snapshot);
                updated.last_opened_at = wall_millis();
                self.persistence
                    .upsert_document(updated)
                    .await
                    .map(|_| ())
                    .map_err(SessionError::from)
            }
        };

        if let Err(e) = result {
            warn!("Folio: save failed: {}", e);
            self.slot
                .stage(StagedAction::error(format!("Save failed: {}", e)));
            return Err(e);
        }

        if let SaveTarget::File(path) = &target {
            let now = self.now_ms();
            self.self_saves.record(path, now);
        }

        // The write was suspended; only clear the dirty flag if the
        // buffer still matches what went to disk. The tab may also have
        // been closed meanwhile, in which case there is nothing to clear
        // and the self-save registration above still stands.
        let unchanged = self
            .cache
            .get(&tab_id)
            .map_or(false, |cache| cache.content == snapshot);
        if unchanged {
            if let Some(idx) = self.position(&tab_id) {
                self.tabs[idx].is_dirty = false;
            }
        }

        if let Some(document_id) = document_id {
            if let Err(e) = self.persistence.touch_document(&document_id, wall_millis()) {
                warn!("Folio: failed to queue document touch: {}", e);
            }
        }

        Ok(true)
    }

    /// True iff a change notification for `path` arriving now would be
    /// an echo of this session's own recent write. Pure query.
    pub fn is_self_save(&self, path: &Path) -> bool {
        self.self_saves.is_within_window(path, self.now_ms())
    }

    /// React to a change notification from the file watcher. Echoes of
    /// our own writes are dropped; genuine external changes reload the
    /// owning tab's buffer (scroll offset survives, dirty flag clears).
    pub async fn handle_file_change(&mut self, event: FileChangeEvent) -> SessionResult<()> {
        if self.is_self_save(&event.path) {
            debug!(
                "Folio: ignoring echo of our own save: {}",
                event.path.display()
            );
            return Ok(());
        }

        let Some(tab_id) = self.tab_for_path(&event.path) else {
            debug!(
                "Folio: change for a path with no open tab: {}",
                event.path.display()
            );
            return Ok(());
        };

        let content = match self.fs.read_file(&event.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Folio: reload after external change failed: {}", e);
                self.slot
                    .stage(StagedAction::error(format!("Reload failed: {}", e)));
                return Err(e.into());
            }
        };

        // The tab may have been closed while the read was in flight
        match self.cache.get_mut(&tab_id) {
            Some(cache) => cache.content = content,
            None => return Ok(()),
        }
        if let Some(idx) = self.position(&tab_id) {
            self.tabs[idx].is_dirty = false;
        }
        info!(
            "Folio: reloaded {} after external change",
            event.path.display()
        );

        Ok(())
    }

    /// Move the active tab's file to a new path, updating the document's
    /// path identity and the watcher.
    pub async fn rename_active_file(&mut self, new_path: &Path) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let old_path = self
            .cache
            .get(&tab_id)
            .and_then(|c| c.file_path.clone())
            .ok_or(SessionError::NoSaveTarget)?;

        self.fs.rename(&old_path, new_path).await?;
        self.persistence
            .rename_file(
                &old_path.to_string_lossy(),
                &new_path.to_string_lossy(),
            )
            .await?;

        let _ = self.fs.unwatch(&old_path);
        if let Err(e) = self.fs.watch(new_path) {
            warn!("Folio: could not watch {}: {}", new_path.display(), e);
        }

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            cache.file_path = Some(new_path.to_path_buf());
            if let Some(doc) = cache.document.as_mut() {
                doc.file_path = Some(new_path.to_string_lossy().to_string());
            }
        }

        info!(
            "Folio: renamed {} to {}",
            old_path.display(),
            new_path.display()
        );
        Ok(())
    }

    /// Rebuild the tab set exactly as persisted: same ids, same order
    /// values, same active tab. File-backed content is read back through
    /// the gateway; a file that fails to load leaves its tab open with
    /// an empty buffer rather than failing the whole restore.
    pub async fn restore_layout(&mut self) -> SessionResult<()> {
        let records = match self.persistence.fetch_tabs().await {
            Ok(records) => records,
            Err(PersistenceError::DatabaseUnavailable(_)) => {
                debug!("Folio: no database, starting with an empty session");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut active = None;
        for record in records {
            let document = match self.persistence.get_document(&record.document_id).await {
                Ok(document) => document,
                Err(PersistenceError::DocumentNotFound(id)) => {
                    warn!("Folio: persisted tab {} references missing document {}", record.id, id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let path = document.file_path.clone().map(PathBuf::from);
            let content = match &path {
                Some(path) => match self.fs.read_file(path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Folio: could not reload {}: {}", path.display(), e);
                        String::new()
                    }
                },
                None => String::new(),
            };

            if record.is_active {
                active = Some(record.id.clone());
            }

            self.tabs.push(Tab {
                id: record.id.clone(),
                document_id: Some(document.id.clone()),
                title: document.title.clone().unwrap_or_default(),
                is_dirty: false,
                order: record.tab_order,
                created_at: record.created_at,
            });

            let mut cache = TabCache::new();
            cache.content = content;
            cache.file_path = path.clone();
            cache.document = Some(document);
            self.cache.insert(&record.id, cache);

            if let Some(path) = &path {
                if let Err(e) = self.fs.watch(path) {
                    warn!("Folio: could not watch {}: {}", path.display(), e);
                }
            }
        }

        self.tabs.sort_by_key(|t| t.order);

        if let Some(active) = active {
            self.active_tab = Some(active.clone());
            self.load_annotations(&active).await?;
        }

        info!("Folio: restored {} tab(s)", self.tabs.len());
        Ok(())
    }

    /// Create a highlight on the active tab's document.
    pub async fn add_highlight(
        &mut self,
        color: HighlightColor,
        text_content: String,
        from_pos: i64,
        to_pos: i64,
        prefix_context: Option<String>,
        suffix_context: Option<String>,
    ) -> SessionResult<HighlightRecord> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let document_id = self
            .cache
            .get(&tab_id)
            .and_then(|c| c.document.as_ref())
            .map(|d| d.id.clone())
            .ok_or(SessionError::NoDocument)?;

        // Offsets are ordered by construction
        let (from_pos, to_pos) = if from_pos <= to_pos {
            (from_pos, to_pos)
        } else {
            (to_pos, from_pos)
        };

        let now = wall_millis();
        let record = HighlightRecord {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.clone(),
            color: color.as_str().to_string(),
            text_content,
            from_pos,
            to_pos,
            prefix_context,
            suffix_context,
            created_at: now,
            updated_at: now,
        };

        self.persistence.insert_highlight(&record).await?;
        if let Err(e) = self.persistence.touch_document(&document_id, now) {
            warn!("Folio: failed to queue document touch: {}", e);
        }

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            let at = cache
                .highlights
                .iter()
                .position(|h| h.from_pos > record.from_pos)
                .unwrap_or(cache.highlights.len());
            cache.highlights.insert(at, record.clone());
        }

        Ok(record)
    }

    /// Change a highlight's color on the active tab.
    pub async fn set_highlight_color(
        &mut self,
        highlight_id: &str,
        color: HighlightColor,
    ) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let now = wall_millis();

        self.persistence
            .set_highlight_color(highlight_id, color.as_str(), now)
            .await?;

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            if let Some(highlight) = cache.highlights.iter_mut().find(|h| h.id == highlight_id) {
                highlight.color = color.as_str().to_string();
                highlight.updated_at = now;
            }
        }
        Ok(())
    }

    /// Remove a highlight from the active tab's cache and stage its
    /// durable deletion behind an undo toast. Commit (expiry, dismiss or
    /// supersession) enqueues the cascade delete; undo puts the cached
    /// copy back, and the database row was never touched.
    pub fn delete_highlight_with_undo(&mut self, highlight_id: &str) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let cache = self
            .cache
            .get_mut(&tab_id)
            .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;

        let at = cache
            .highlights
            .iter()
            .position(|h| h.id == highlight_id)
            .ok_or_else(|| SessionError::HighlightNotFound(highlight_id.to_string()))?;
        let highlight = cache.highlights.remove(at);

        let mut notes = Vec::new();
        cache.margin_notes.retain(|note| {
            if note.highlight_id == highlight.id {
                notes.push(note.clone());
                false
            } else {
                true
            }
        });

        let persistence = Arc::clone(&self.persistence);
        let delete_id = highlight.id.clone();
        let restore_tx = self.restore_tx.clone();
        let restore = RestoreRequest { highlight, notes };

        self.slot.stage(StagedAction::undoable(
            "Deleted highlight",
            move || {
                if let Err(e) = persistence.delete_highlight(&delete_id) {
                    warn!("Folio: failed to queue highlight delete: {}", e);
                }
            },
            move || {
                let _ = restore_tx.send(restore);
            },
        ));

        Ok(())
    }

    /// Put an undone highlight back into the cache of the tab that shows
    /// its document. Called by the engine owner when the undo-restore
    /// channel delivers a request.
    pub fn apply_restore(&mut self, request: RestoreRequest) {
        let Some(tab_id) = self.tab_for_document(&request.highlight.document_id) else {
            debug!("Folio: undo restore for a document with no open tab");
            return;
        };
        if let Some(cache) = self.cache.get_mut(&tab_id) {
            let at = cache
                .highlights
                .iter()
                .position(|h| h.from_pos > request.highlight.from_pos)
                .unwrap_or(cache.highlights.len());
            cache.highlights.insert(at, request.highlight);
            cache.margin_notes.extend(request.notes);
        }
    }

    /// Attach a margin note to a highlight on the active tab.
    pub async fn add_margin_note(
        &mut self,
        highlight_id: &str,
        content: String,
    ) -> SessionResult<MarginNoteRecord> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;

        {
            let cache = self
                .cache
                .get(&tab_id)
                .ok_or_else(|| SessionError::TabNotFound(tab_id.clone()))?;
            if !cache.highlights.iter().any(|h| h.id == highlight_id) {
                return Err(SessionError::HighlightNotFound(highlight_id.to_string()));
            }
        }

        let now = wall_millis();
        let record = MarginNoteRecord {
            id: Uuid::new_v4().to_string(),
            highlight_id: highlight_id.to_string(),
            content,
            created_at: now,
            updated_at: now,
        };

        self.persistence.insert_margin_note(&record).await?;

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            cache.margin_notes.push(record.clone());
        }
        Ok(record)
    }

    /// Edit a margin note's content on the active tab.
    pub async fn update_margin_note(
        &mut self,
        note_id: &str,
        content: String,
    ) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;
        let now = wall_millis();

        self.persistence
            .update_margin_note(note_id, &content, now)
            .await?;

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            match cache.margin_notes.iter_mut().find(|n| n.id == note_id) {
                Some(note) => {
                    note.content = content;
                    note.updated_at = now;
                }
                None => return Err(SessionError::MarginNoteNotFound(note_id.to_string())),
            }
        }
        Ok(())
    }

    /// Delete a margin note from the active tab. Not undoable; the
    /// highlight stays.
    pub async fn delete_margin_note(&mut self, note_id: &str) -> SessionResult<()> {
        let tab_id = self.active_tab.clone().ok_or(SessionError::NoActiveTab)?;

        self.persistence.delete_margin_note(note_id).await?;

        if let Some(cache) = self.cache.get_mut(&tab_id) {
            cache.margin_notes.retain(|n| n.id != note_id);
        }
        Ok(())
    }
}
