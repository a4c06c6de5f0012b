// Folio Document Session
//
// The session engine and the state it owns: the tab cache store and the
// self-save tracker. Session state is an explicitly constructed object
// owned by one driver task, created on session start and torn down on
// session close.

mod engine;
mod error;
mod self_save;
mod tab_cache;

pub use engine::{RestoreRequest, SessionConfig, SessionEngine, Tab};
pub use error::{SessionError, SessionResult};
pub use self_save::{SelfSaveTracker, DEFAULT_SUPPRESSION_WINDOW_MS};
pub use tab_cache::{AnnotationLoadState, TabCache, TabCacheStore};

#[cfg(test)]
#[path = "unit/engine_tests.rs"]
mod engine_tests;
