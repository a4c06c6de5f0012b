// Database record models

use serde::{Deserialize, Serialize};

/// Document record corresponding to the documents table.
///
/// Exactly one of `file_path` / `library_id` is non-null, determined by
/// `source` ("file" or "library").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: String,
    pub source: String,
    pub file_path: Option<String>,
    pub library_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub word_count: i64,
    pub last_opened_at: i64,
    pub created_at: i64,
}

/// Open-tab record corresponding to the open_tabs table.
///
/// One row per live tab; the whole set is rewritten on every structural
/// change so the layout round-trips exactly across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TabRecord {
    pub id: String,
    pub document_id: String,
    pub tab_order: i64,
    pub is_active: bool,
    pub created_at: i64,
}

/// Highlight record corresponding to the highlights table.
///
/// `from_pos <= to_pos` always; the optional contexts allow fuzzy
/// re-anchoring when character offsets drift.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HighlightRecord {
    pub id: String,
    pub document_id: String,
    pub color: String,
    pub text_content: String,
    pub from_pos: i64,
    pub to_pos: i64,
    pub prefix_context: Option<String>,
    pub suffix_context: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Margin-note record corresponding to the margin_notes table.
///
/// A note cannot outlive its highlight: the schema cascades the delete.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarginNoteRecord {
    pub id: String,
    pub highlight_id: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}
