// Persistence Manager with write-behind caching

use super::{
    error::{PersistenceError, PersistenceResult},
    models::{DocumentRecord, HighlightRecord, MarginNoteRecord, TabRecord},
};
use log::{debug, error, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

/// Write operations to be queued for async processing
#[derive(Debug)]
pub enum WriteOperation {
    /// Rewrite the whole open-tab set in one transaction. The layout is
    /// small and replacing it wholesale keeps tab_order values consistent
    /// with what the session holds in memory.
    ReplaceTabs(Vec<TabRecord>),
    SetActiveTab {
        tab_id: String,
    },
    TouchDocument {
        document_id: String,
        last_opened_at: i64,
    },
    /// Cascades to the highlight's margin notes at the schema level.
    DeleteHighlight {
        highlight_id: String,
    },
    /// Barrier: resolves once every operation queued before it has been
    /// executed. Used on shutdown and in tests.
    Flush(oneshot::Sender<()>),
}

/// Persistence Manager implementing a write-behind strategy for layout
/// writes (tab set, active tab, document touch) and direct awaited
/// queries for everything the session needs an answer to.
pub struct PersistenceManager {
    pool: Option<SqlitePool>,
    write_queue_tx: UnboundedSender<WriteOperation>,
    is_available: bool,
}

impl PersistenceManager {
    /// Create a new PersistenceManager backed by an SQLite file.
    ///
    /// Gracefully degrades if the database cannot be opened: the session
    /// keeps running, layout writes become no-ops and reads report
    /// `DatabaseUnavailable`.
    pub async fn new(db_path: Option<&Path>) -> Self {
        let (write_queue_tx, write_queue_rx) = mpsc::unbounded_channel();

        let pool = match db_path {
            Some(path) => {
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .foreign_keys(true);

                match SqlitePoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect_with(options)
                    .await
                {
                    Ok(pool) => {
                        info!("Folio: SQLite pool established at {}", path.display());
                        match sqlx::migrate!("./migrations").run(&pool).await {
                            Ok(_) => info!("Folio: Database migrations applied successfully"),
                            Err(e) => {
                                error!("Folio: Migration failed: {}", e);
                                warn!("Folio: Continuing without persistence");
                                return Self {
                                    pool: None,
                                    write_queue_tx,
                                    is_available: false,
                                };
                            }
                        }
                        Some(pool)
                    }
                    Err(e) => {
                        warn!("Folio: Failed to open SQLite database: {}", e);
                        warn!("Folio: Continuing without persistence");
                        None
                    }
                }
            }
            None => {
                info!("Folio: No database path provided, persistence disabled");
                None
            }
        };

        let is_available = pool.is_some();

        // Spawn write queue processor
        if let Some(pool_clone) = pool.clone() {
            tokio::spawn(async move {
                Self::process_write_queue(pool_clone, write_queue_rx).await;
            });
        }

        Self {
            pool,
            write_queue_tx,
            is_available,
        }
    }

    /// Check if persistence is available
    pub fn is_available(&self) -> bool {
        self.is_available
    }

    fn pool(&self) -> PersistenceResult<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| PersistenceError::DatabaseUnavailable("No pool".to_string()))
    }

    /// Queue a write operation for async processing (write-behind)
    pub fn queue_write(&self, operation: WriteOperation) -> PersistenceResult<()> {
        if !self.is_available {
            // Silently ignore writes when the database is unavailable
            return Ok(());
        }

        self.write_queue_tx
            .send(operation)
            .map_err(|e| PersistenceError::QueryFailed(format!("Failed to queue write: {}", e)))
    }

    /// Persist the whole tab set (queued async write)
    pub fn replace_tabs(&self, tabs: Vec<TabRecord>) -> PersistenceResult<()> {
        self.queue_write(WriteOperation::ReplaceTabs(tabs))
    }

    /// Mark one tab active, all others inactive (queued async write)
    pub fn set_active_tab(&self, tab_id: &str) -> PersistenceResult<()> {
        self.queue_write(WriteOperation::SetActiveTab {
            tab_id: tab_id.to_string(),
        })
    }

    /// Bump a document's last_opened_at (queued async write)
    pub fn touch_document(&self, document_id: &str, last_opened_at: i64) -> PersistenceResult<()> {
        self.queue_write(WriteOperation::TouchDocument {
            document_id: document_id.to_string(),
            last_opened_at,
        })
    }

    /// Delete a highlight and, via cascade, its margin notes (queued async
    /// write). Queued rather than awaited so a staged-action commit effect
    /// can enqueue it from a synchronous context.
    pub fn delete_highlight(&self, highlight_id: &str) -> PersistenceResult<()> {
        self.queue_write(WriteOperation::DeleteHighlight {
            highlight_id: highlight_id.to_string(),
        })
    }

    /// Wait until every previously queued write has been executed.
    pub async fn flush(&self) -> PersistenceResult<()> {
        if !self.is_available {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.queue_write(WriteOperation::Flush(tx))?;
        rx.await.map_err(|_| {
            PersistenceError::QueryFailed("Write queue stopped before flush".to_string())
        })
    }

    /// Restore the persisted tab set, ordered by tab_order (synchronous read)
    pub async fn fetch_tabs(&self) -> PersistenceResult<Vec<TabRecord>> {
        let tabs = sqlx::query_as::<_, TabRecord>(
            "SELECT id, document_id, tab_order, is_active, created_at
             FROM open_tabs ORDER BY tab_order ASC",
        )
        .fetch_all(self.pool()?)
        .await?;

        Ok(tabs)
    }

    /// Look up a document by id (synchronous read)
    pub async fn get_document(&self, id: &str) -> PersistenceResult<DocumentRecord> {
        let doc = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, source, file_path, library_id, title, author, url,
                    word_count, last_opened_at, created_at
             FROM documents WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(self.pool()?)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PersistenceError::DocumentNotFound(id.to_string()),
            _ => e.into(),
        })?;

        Ok(doc)
    }

    /// Look up a document by its file path (synchronous read)
    pub async fn get_document_by_path(
        &self,
        file_path: &str,
    ) -> PersistenceResult<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, source, file_path, library_id, title, author, url,
                    word_count, last_opened_at, created_at
             FROM documents WHERE file_path = ?1",
        )
        .bind(file_path)
        .fetch_optional(self.pool()?)
        .await?;

        Ok(doc)
    }

    /// Look up a document by its library item id (synchronous read)
    pub async fn get_document_by_library_id(
        &self,
        library_id: &str,
    ) -> PersistenceResult<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, source, file_path, library_id, title, author, url,
                    word_count, last_opened_at, created_at
             FROM documents WHERE library_id = ?1",
        )
        .bind(library_id)
        .fetch_optional(self.pool()?)
        .await?;

        Ok(doc)
    }

    /// Most recently opened documents, newest first (synchronous read)
    pub async fn get_recent_documents(&self, limit: i64) -> PersistenceResult<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, source, file_path, library_id, title, author, url,
                    word_count, last_opened_at, created_at
             FROM documents ORDER BY last_opened_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;

        Ok(docs)
    }

    /// Insert or update a document record (awaited write).
    ///
    /// Returns the record as stored. When the database is unavailable the
    /// record is echoed back unpersisted so the session can keep going.
    pub async fn upsert_document(&self, doc: DocumentRecord) -> PersistenceResult<DocumentRecord> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => {
                debug!("Folio: upsert_document skipped, persistence disabled");
                return Ok(doc);
            }
        };

        sqlx::query(
            "INSERT INTO documents
                (id, source, file_path, library_id, title, author, url,
                 word_count, last_opened_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                url = excluded.url,
                word_count = excluded.word_count,
                last_opened_at = excluded.last_opened_at",
        )
        .bind(&doc.id)
        .bind(&doc.source)
        .bind(&doc.file_path)
        .bind(&doc.library_id)
        .bind(&doc.title)
        .bind(&doc.author)
        .bind(&doc.url)
        .bind(doc.word_count)
        .bind(doc.last_opened_at)
        .bind(doc.created_at)
        .execute(pool)
        .await?;

        Ok(doc)
    }

    /// Move a tracked document to a new path (awaited write)
    pub async fn rename_file(&self, old_path: &str, new_path: &str) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query("UPDATE documents SET file_path = ?1 WHERE file_path = ?2")
            .bind(new_path)
            .bind(old_path)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a highlight (awaited write)
    pub async fn insert_highlight(&self, highlight: &HighlightRecord) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query(
            "INSERT INTO highlights
                (id, document_id, color, text_content, from_pos, to_pos,
                 prefix_context, suffix_context, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&highlight.id)
        .bind(&highlight.document_id)
        .bind(&highlight.color)
        .bind(&highlight.text_content)
        .bind(highlight.from_pos)
        .bind(highlight.to_pos)
        .bind(&highlight.prefix_context)
        .bind(&highlight.suffix_context)
        .bind(highlight.created_at)
        .bind(highlight.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// All highlights for a document, in reading order (synchronous read)
    pub async fn fetch_highlights(
        &self,
        document_id: &str,
    ) -> PersistenceResult<Vec<HighlightRecord>> {
        let highlights = sqlx::query_as::<_, HighlightRecord>(
            "SELECT id, document_id, color, text_content, from_pos, to_pos,
                    prefix_context, suffix_context, created_at, updated_at
             FROM highlights WHERE document_id = ?1 ORDER BY from_pos",
        )
        .bind(document_id)
        .fetch_all(self.pool()?)
        .await?;

        Ok(highlights)
    }

    /// Change a highlight's color (awaited write)
    pub async fn set_highlight_color(
        &self,
        highlight_id: &str,
        color: &str,
        now: i64,
    ) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query("UPDATE highlights SET color = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(color)
            .bind(now)
            .bind(highlight_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a margin note (awaited write)
    pub async fn insert_margin_note(&self, note: &MarginNoteRecord) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query(
            "INSERT INTO margin_notes (id, highlight_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&note.id)
        .bind(&note.highlight_id)
        .bind(&note.content)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// All margin notes for a document, ordered by their highlight's
    /// position (synchronous read)
    pub async fn fetch_margin_notes(
        &self,
        document_id: &str,
    ) -> PersistenceResult<Vec<MarginNoteRecord>> {
        let notes = sqlx::query_as::<_, MarginNoteRecord>(
            "SELECT mn.id, mn.highlight_id, mn.content, mn.created_at, mn.updated_at
             FROM margin_notes mn
             JOIN highlights h ON mn.highlight_id = h.id
             WHERE h.document_id = ?1
             ORDER BY h.from_pos",
        )
        .bind(document_id)
        .fetch_all(self.pool()?)
        .await?;

        Ok(notes)
    }

    /// Edit a margin note's content (awaited write)
    pub async fn update_margin_note(
        &self,
        note_id: &str,
        content: &str,
        now: i64,
    ) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query("UPDATE margin_notes SET content = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(content)
            .bind(now)
            .bind(note_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Delete a margin note (awaited write)
    pub async fn delete_margin_note(&self, note_id: &str) -> PersistenceResult<()> {
        let pool = match self.pool.as_ref() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        sqlx::query("DELETE FROM margin_notes WHERE id = ?1")
            .bind(note_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Process write queue (background task)
    async fn process_write_queue(pool: SqlitePool, mut rx: UnboundedReceiver<WriteOperation>) {
        info!("Folio: Write queue processor started");

        while let Some(operation) = rx.recv().await {
            if let Err(e) = Self::execute_write_operation(&pool, operation).await {
                error!("Folio: Write operation failed: {}", e);
                // Continue processing; a failed layout write must not take
                // the session down with it
            }
        }

        warn!("Folio: Write queue processor stopped");
    }

    /// Execute a single write operation
    async fn execute_write_operation(
        pool: &SqlitePool,
        operation: WriteOperation,
    ) -> PersistenceResult<()> {
        match operation {
            WriteOperation::ReplaceTabs(tabs) => {
                let mut tx = pool.begin().await?;

                sqlx::query("DELETE FROM open_tabs").execute(&mut *tx).await?;

                for tab in &tabs {
                    sqlx::query(
                        "INSERT INTO open_tabs (id, document_id, tab_order, is_active, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .bind(&tab.id)
                    .bind(&tab.document_id)
                    .bind(tab.tab_order)
                    .bind(tab.is_active)
                    .bind(tab.created_at)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
            }
            WriteOperation::SetActiveTab { tab_id } => {
                sqlx::query(
                    "UPDATE open_tabs SET is_active = CASE WHEN id = ?1 THEN 1 ELSE 0 END",
                )
                .bind(&tab_id)
                .execute(pool)
                .await?;
            }
            WriteOperation::TouchDocument {
                document_id,
                last_opened_at,
            } => {
                sqlx::query("UPDATE documents SET last_opened_at = ?1 WHERE id = ?2")
                    .bind(last_opened_at)
                    .bind(&document_id)
                    .execute(pool)
                    .await?;
            }
            WriteOperation::DeleteHighlight { highlight_id } => {
                sqlx::query("DELETE FROM highlights WHERE id = ?1")
                    .bind(&highlight_id)
                    .execute(pool)
                    .await?;
            }
            WriteOperation::Flush(ack) => {
                // Every operation queued before this one has executed
                let _ = ack.send(());
            }
        }

        Ok(())
    }
}
