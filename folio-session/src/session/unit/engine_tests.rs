// Unit tests for the session engine: save/suppression lifecycle, tab
// lifecycle, and undoable highlight deletion, driven against the mock
// file-system gateway. Tests that need timer behavior run under tokio's
// paused clock.

use crate::gateways::{FileChangeEvent, FileSystemGateway, GatewayConfig, MockFileSystem};
use crate::persistence::{DocumentRecord, PersistenceManager};
use crate::session::engine::{RestoreRequest, SessionConfig, SessionEngine};
use crate::session::error::SessionError;
use crate::session::tab_cache::AnnotationLoadState;
use folio_utils::data::HighlightColor;
use folio_utils::toast::ToastKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const TEST_PATH: &str = "/docs/test.md";

/// Engine wired to a mock gateway and no database: everything the
/// suppression and tab-lifecycle tests need, with no real I/O that would
/// fight the paused clock.
async fn engine_without_db() -> (
    SessionEngine,
    Arc<MockFileSystem>,
    UnboundedReceiver<RestoreRequest>,
) {
    let (mock, _events) = MockFileSystem::new(GatewayConfig::default());
    let mock = Arc::new(mock);
    let persistence = Arc::new(PersistenceManager::new(None).await);
    let (engine, restores) = SessionEngine::new(
        mock.clone() as Arc<dyn FileSystemGateway>,
        persistence,
        SessionConfig::default(),
    );
    (engine, mock, restores)
}

fn change_event(path: &Path) -> FileChangeEvent {
    FileChangeEvent {
        path: path.to_path_buf(),
        timestamp: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn test_save_registers_self_save_then_window_expires() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    engine.open_file(path).await.unwrap();
    engine
        .update_content("hello world, edited".to_string())
        .unwrap();
    assert!(engine.tabs()[0].is_dirty);

    assert!(engine.save_current_file().await.unwrap());
    assert!(!engine.tabs()[0].is_dirty);
    assert_eq!(mock.file_content(path).unwrap(), "hello world, edited");

    // Suppressed immediately after the save, and on repeated queries;
    // reading does not reset the window
    assert!(engine.is_self_save(path));
    assert!(engine.is_self_save(path));
    assert!(!engine.is_self_save(Path::new("/docs/other.md")));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!engine.is_self_save(path));
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_keeps_dirty_and_registers_nothing() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    engine.open_file(path).await.unwrap();
    engine.update_content("edited".to_string()).unwrap();

    mock.set_fail_writes(true);
    assert!(engine.save_current_file().await.is_err());
    assert!(engine.tabs()[0].is_dirty);
    assert!(!engine.is_self_save(path));

    let toast = engine.staged_toast().expect("error toast staged");
    assert_eq!(toast.kind, ToastKind::Error);
    assert!(toast.message.contains("Save failed"));

    // Retry once the failure clears
    mock.set_fail_writes(false);
    assert!(engine.save_current_file().await.unwrap());
    assert!(!engine.tabs()[0].is_dirty);
    assert!(engine.is_self_save(path));
}

#[tokio::test(start_paused = true)]
async fn test_save_on_clean_tab_is_a_noop() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    engine.open_file(path).await.unwrap();
    assert!(!engine.save_current_file().await.unwrap());
    assert_eq!(mock.write_count(), 0);
    assert!(!engine.is_self_save(path));
}

#[tokio::test(start_paused = true)]
async fn test_echo_suppressed_but_external_change_reloads() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "original");

    let tab_id = engine.open_file(path).await.unwrap();
    engine.update_scroll(42.0).unwrap();
    engine.update_content("edited".to_string()).unwrap();
    engine.save_current_file().await.unwrap();

    // The watcher reports the write we just made; nothing reloads
    engine.handle_file_change(change_event(path)).await.unwrap();
    assert_eq!(mock.read_count(), 1); // just the open
    assert_eq!(engine.tab_cache(&tab_id).unwrap().content, "edited");

    // Past the window the same notification is a genuine external change
    tokio::time::sleep(Duration::from_millis(1200)).await;
    mock.set_file(path, "external edit");
    engine.handle_file_change(change_event(path)).await.unwrap();

    let cache = engine.tab_cache(&tab_id).unwrap();
    assert_eq!(cache.content, "external edit");
    assert_eq!(cache.scroll_position, 42.0);
    assert!(!engine.tabs()[0].is_dirty);
}

#[tokio::test(start_paused = true)]
async fn test_change_for_unopened_path_is_ignored() {
    let (mut engine, _mock, _restores) = engine_without_db().await;
    engine
        .handle_file_change(change_event(Path::new("/docs/unknown.md")))
        .await
        .unwrap();
    assert!(engine.tabs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reorder_keeps_orders_dense_and_distinct() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    for name in ["a", "b", "c"] {
        let path = format!("/docs/{}.md", name);
        mock.set_file(Path::new(&path), name);
        engine.open_file(Path::new(&path)).await.unwrap();
    }

    engine.reorder_tabs(0, 2).unwrap();

    let titles: Vec<&str> = engine.tabs().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "c", "a"]);

    let orders: Vec<i64> = engine.tabs().iter().map(|t| t.order).collect();
    assert_eq!(orders, vec![0, 1, 2]);

    engine.reorder_tabs(2, 0).unwrap();
    let titles: Vec<&str> = engine.tabs().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["a", "b", "c"]);

    assert!(matches!(
        engine.reorder_tabs(5, 0),
        Err(SessionError::InvalidIndex(5))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_close_active_tab_promotes_neighbor() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let mut tab_ids = Vec::new();
    for name in ["a", "b", "c"] {
        let path = format!("/docs/{}.md", name);
        mock.set_file(Path::new(&path), name);
        tab_ids.push(engine.open_file(Path::new(&path)).await.unwrap());
    }
    assert_eq!(engine.active_tab_id(), Some(tab_ids[2].as_str()));

    engine.close_tab(&tab_ids[2]).await.unwrap();
    assert_eq!(engine.active_tab_id(), Some(tab_ids[1].as_str()));
    assert_eq!(
        engine.tabs().iter().map(|t| t.order).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert!(!mock
        .watched_paths()
        .contains(&Path::new("/docs/c.md").to_path_buf()));

    // Closing a non-active tab leaves the active one alone
    engine.close_tab(&tab_ids[0]).await.unwrap();
    assert_eq!(engine.active_tab_id(), Some(tab_ids[1].as_str()));
    assert!(engine.tab_cache(&tab_ids[0]).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_open_same_path_switches_instead_of_duplicating() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    mock.set_file(Path::new("/docs/a.md"), "alpha");
    mock.set_file(Path::new("/docs/b.md"), "beta");

    let tab_a = engine.open_file(Path::new("/docs/a.md")).await.unwrap();
    let tab_b = engine.open_file(Path::new("/docs/b.md")).await.unwrap();
    assert_eq!(engine.active_tab_id(), Some(tab_b.as_str()));

    let again = engine.open_file(Path::new("/docs/a.md")).await.unwrap();
    assert_eq!(again, tab_a);
    assert_eq!(engine.tabs().len(), 2);
    assert_eq!(engine.active_tab_id(), Some(tab_a.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_restore_from_cache_performs_no_io() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    let tab_id = engine.open_file(path).await.unwrap();
    assert_eq!(mock.read_count(), 1);

    let document = DocumentRecord {
        id: "doc-cached".to_string(),
        source: "file".to_string(),
        file_path: Some("/docs/cached.md".to_string()),
        library_id: None,
        title: Some("Cached".to_string()),
        author: None,
        url: None,
        word_count: 2,
        last_opened_at: 1000,
        created_at: 1000,
    };
    engine
        .restore_from_cache(
            document,
            "cached content".to_string(),
            Some(Path::new("/docs/cached.md").to_path_buf()),
            true,
        )
        .unwrap();

    // No gateway traffic, no suppression registered
    assert_eq!(mock.read_count(), 1);
    assert_eq!(mock.write_count(), 0);
    assert!(!engine.is_self_save(Path::new("/docs/cached.md")));

    let cache = engine.tab_cache(&tab_id).unwrap();
    assert_eq!(cache.content, "cached content");
    assert!(engine.tabs()[0].is_dirty);
    assert_eq!(engine.tabs()[0].title, "Cached");
}

#[tokio::test(start_paused = true)]
async fn test_delete_highlight_undo_restores_cache() {
    let (mut engine, mock, mut restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    let tab_id = engine.open_file(path).await.unwrap();
    let highlight = engine
        .add_highlight(HighlightColor::Yellow, "hello".to_string(), 0, 5, None, None)
        .await
        .unwrap();
    engine
        .add_margin_note(&highlight.id, "a note".to_string())
        .await
        .unwrap();

    engine.delete_highlight_with_undo(&highlight.id).unwrap();
    let cache = engine.tab_cache(&tab_id).unwrap();
    assert!(cache.highlights.is_empty());
    assert!(cache.margin_notes.is_empty());

    let toast = engine.staged_toast().unwrap();
    assert_eq!(toast.kind, ToastKind::Undo);
    assert_eq!(toast.message, "Deleted highlight");

    assert!(engine.request_undo());
    let request = restores.try_recv().expect("undo sends a restore request");
    engine.apply_restore(request);

    let cache = engine.tab_cache(&tab_id).unwrap();
    assert_eq!(cache.highlights.len(), 1);
    assert_eq!(cache.highlights[0].id, highlight.id);
    assert_eq!(cache.margin_notes.len(), 1);
    assert!(engine.staged_toast().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delete_highlight_expiry_commits() {
    let (mut engine, mock, mut restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    let tab_id = engine.open_file(path).await.unwrap();
    let highlight = engine
        .add_highlight(HighlightColor::Green, "hello".to_string(), 0, 5, None, None)
        .await
        .unwrap();

    engine.delete_highlight_with_undo(&highlight.id).unwrap();
    tokio::time::sleep(ToastKind::Undo.default_duration() + Duration::from_secs(1)).await;

    // Committed: toast gone, nothing restored
    assert!(engine.staged_toast().is_none());
    assert!(restores.try_recv().is_err());
    assert!(engine.tab_cache(&tab_id).unwrap().highlights.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_content_marks_dirty_only_on_change() {
    let (mut engine, mock, _restores) = engine_without_db().await;
    let path = Path::new(TEST_PATH);
    mock.set_file(path, "hello world");

    engine.open_file(path).await.unwrap();
    engine.update_content("hello world".to_string()).unwrap();
    assert!(!engine.tabs()[0].is_dirty);

    engine.update_content("hello world!".to_string()).unwrap();
    assert!(engine.tabs()[0].is_dirty);
}

#[tokio::test(start_paused = true)]
async fn test_open_library_document_saves_through_persistence() {
    let (mut engine, mock, _restores) = engine_without_db().await;

    let tab_id = engine
        .open_library_document("item-1", Some("An Article".to_string()), "body text".to_string())
        .await
        .unwrap();
    assert_eq!(engine.tabs()[0].title, "An Article");
    assert!(engine.tab_cache(&tab_id).unwrap().file_path.is_none());

    engine.update_content("body text, annotated".to_string()).unwrap();
    assert!(engine.save_current_file().await.unwrap());

    // Library saves never touch the file system or the tracker
    assert_eq!(mock.write_count(), 0);
    assert!(!engine.tabs()[0].is_dirty);

    // Reopening the same library item switches tabs
    let again = engine
        .open_library_document("item-1", None, String::new())
        .await
        .unwrap();
    assert_eq!(again, tab_id);
    assert_eq!(engine.tabs().len(), 1);
}

#[tokio::test]
async fn test_layout_roundtrip_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("folio.db");

    let (mock, _events) = MockFileSystem::new(GatewayConfig::default());
    let mock = Arc::new(mock);
    mock.set_file(Path::new("/docs/a.md"), "alpha");
    mock.set_file(Path::new("/docs/b.md"), "beta");

    let persistence = Arc::new(PersistenceManager::new(Some(db.as_path())).await);
    assert!(persistence.is_available());

    let (mut engine, _restores) = SessionEngine::new(
        mock.clone() as Arc<dyn FileSystemGateway>,
        persistence.clone(),
        SessionConfig::default(),
    );
    engine.open_file(Path::new("/docs/a.md")).await.unwrap();
    let tab_b = engine.open_file(Path::new("/docs/b.md")).await.unwrap();
    engine.reorder_tabs(1, 0).unwrap();
    engine.set_active_tab(&tab_b).await.unwrap();
    persistence.flush().await.unwrap();

    let (mut restored, _restores2) = SessionEngine::new(
        mock.clone() as Arc<dyn FileSystemGateway>,
        persistence.clone(),
        SessionConfig::default(),
    );
    restored.restore_layout().await.unwrap();

    assert_eq!(restored.tabs().len(), 2);
    let titles: Vec<&str> = restored.tabs().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "a"]);
    assert_eq!(
        restored.tabs().iter().map(|t| t.order).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(restored.active_tab_id(), Some(tab_b.as_str()));
    assert_eq!(restored.tab_cache(&tab_b).unwrap().content, "beta");
    assert_eq!(mock.watched_paths().len(), 2);
}

#[tokio::test]
async fn test_annotations_survive_restart_and_load_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("folio.db");

    let (mock, _events) = MockFileSystem::new(GatewayConfig::default());
    let mock = Arc::new(mock);
    mock.set_file(Path::new("/docs/a.md"), "hello world");

    let persistence = Arc::new(PersistenceManager::new(Some(db.as_path())).await);
    let (mut engine, _restores) = SessionEngine::new(
        mock.clone() as Arc<dyn FileSystemGateway>,
        persistence.clone(),
        SessionConfig::default(),
    );
    let tab_id = engine.open_file(Path::new("/docs/a.md")).await.unwrap();
    let highlight = engine
        .add_highlight(HighlightColor::Blue, "hello".to_string(), 0, 5, None, None)
        .await
        .unwrap();
    engine
        .add_margin_note(&highlight.id, "remember this".to_string())
        .await
        .unwrap();
    persistence.flush().await.unwrap();
    drop(engine);

    let (mut restored, _restores2) = SessionEngine::new(
        mock.clone() as Arc<dyn FileSystemGateway>,
        persistence.clone(),
        SessionConfig::default(),
    );
    restored.restore_layout().await.unwrap();

    let cache = restored.tab_cache(&tab_id).unwrap();
    assert_eq!(cache.annotations, AnnotationLoadState::Loaded);
    assert_eq!(cache.highlights.len(), 1);
    assert_eq!(cache.highlights[0].text_content, "hello");
    assert_eq!(cache.margin_notes.len(), 1);
    assert_eq!(cache.margin_notes[0].content, "remember this");
}
