// Folio Persistence Layer
//
// This module provides async SQLite persistence for Folio documents,
// open tabs, highlights and margin notes, with write-behind queuing for
// layout writes and graceful degradation when no database is available.

mod error;
mod manager;
mod models;

pub use error::{PersistenceError, PersistenceResult};
pub use manager::{PersistenceManager, WriteOperation};
pub use models::{DocumentRecord, HighlightRecord, MarginNoteRecord, TabRecord};
