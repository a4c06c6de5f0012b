// Folio Staged Actions
//
// One parameterized timer-backed slot backs both transient notification
// kinds: undoable destructive edits and informational errors.

mod slot;

pub use slot::{Effect, StagedAction, StagedActionSlot};
