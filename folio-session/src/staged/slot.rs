// Staged-action slot
//
// A single-slot, timer-backed state machine holding at most one pending
// action: Idle -> Staged -> (Committed | Undone). Undo toasts and error
// toasts are the same machine with different configuration; an error
// toast simply has no-op effects and a shorter deadline.
//
// Exactly one of {commit, undo} fires per staged action, exactly once:
// the effects are FnOnce closures moved out of the slot on transition,
// so a second fire is unrepresentable. Staging over an existing action
// commits the predecessor (supersession is a commit, never a silent
// drop).

use folio_utils::toast::{Toast, ToastKind};
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Effect fired when a staged action commits or is undone.
pub type Effect = Box<dyn FnOnce() + Send + 'static>;

fn noop() -> Effect {
    Box::new(|| {})
}

/// A pending action: a toast to show, a deadline, and the two effects of
/// which exactly one will run.
pub struct StagedAction {
    id: String,
    toast: Toast,
    duration: Duration,
    commit: Effect,
    undo: Effect,
}

impl StagedAction {
    /// An undoable action: `commit` runs on expiry, explicit dismiss or
    /// supersession; `undo` runs if the user reacts in time.
    pub fn undoable<C, U>(message: impl Into<String>, commit: C, undo: U) -> Self
    where
        C: FnOnce() + Send + 'static,
        U: FnOnce() + Send + 'static,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            toast: Toast::undo(message),
            duration: ToastKind::Undo.default_duration(),
            commit: Box::new(commit),
            undo: Box::new(undo),
        }
    }

    /// An informational error: nothing to undo, nothing to commit, just a
    /// toast that goes away on its own.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            toast: Toast::error(message),
            duration: ToastKind::Error.default_duration(),
            commit: noop(),
            undo: noop(),
        }
    }

    /// Override the deadline.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

struct ActiveAction {
    id: String,
    toast: Toast,
    commit: Option<Effect>,
    undo: Option<Effect>,
    generation: u64,
    timer: JoinHandle<()>,
}

struct SlotInner {
    current: Option<ActiveAction>,
    /// Monotonic staging counter; a deadline task only commits the
    /// generation it was started for, so an aborted-but-already-polled
    /// timer can never touch a successor action.
    generation: u64,
}

/// The single slot of pending staged actions.
///
/// Clones share the slot; the deadline task holds one clone so expiry
/// commits even if nothing ever queries the slot again.
#[derive(Clone)]
pub struct StagedActionSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl StagedActionSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotInner {
                current: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stage an action, committing any action already staged.
    ///
    /// Must be called from within a tokio runtime (the deadline task is
    /// spawned here).
    pub fn stage(&self, action: StagedAction) {
        // Supersession: the predecessor's commit runs before the new
        // action is installed, outside the lock
        let superseded = {
            let mut inner = self.lock();
            inner.current.take().map(|mut prev| {
                prev.timer.abort();
                (prev.id, prev.commit.take())
            })
        };
        if let Some((id, commit)) = superseded {
            debug!("Folio: staged action {} superseded, committing", id);
            if let Some(commit) = commit {
                commit();
            }
        }

        let StagedAction {
            id,
            toast,
            duration,
            commit,
            undo,
        } = action;

        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;

        let slot = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let expired = {
                let mut inner = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match inner.current.take() {
                    Some(mut active) if active.generation == generation => {
                        Some((active.id, active.commit.take()))
                    }
                    Some(active) => {
                        // Stale deadline for an already-replaced action
                        inner.current = Some(active);
                        None
                    }
                    None => None,
                }
            };
            if let Some((id, commit)) = expired {
                debug!("Folio: staged action {} expired, committing", id);
                if let Some(commit) = commit {
                    commit();
                }
            }
        });

        inner.current = Some(ActiveAction {
            id,
            toast,
            commit: Some(commit),
            undo: Some(undo),
            generation,
            timer,
        });
    }

    /// Undo the staged action. Returns false when nothing is staged.
    pub fn request_undo(&self) -> bool {
        let undo = {
            let mut inner = self.lock();
            inner.current.take().map(|mut active| {
                active.timer.abort();
                active.undo.take()
            })
        };
        match undo {
            Some(Some(undo)) => {
                undo();
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    /// Commit the staged action now (explicit dismiss). Returns false
    /// when nothing is staged.
    pub fn request_commit(&self) -> bool {
        let commit = {
            let mut inner = self.lock();
            inner.current.take().map(|mut active| {
                active.timer.abort();
                active.commit.take()
            })
        };
        match commit {
            Some(Some(commit)) => {
                commit();
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    /// The toast to display for the currently staged action, if any.
    /// Read-only projection for the presentation layer.
    pub fn current(&self) -> Option<Toast> {
        self.lock().current.as_ref().map(|active| active.toast.clone())
    }

    pub fn is_staged(&self) -> bool {
        self.lock().current.is_some()
    }
}

impl Default for StagedActionSlot {
    fn default() -> Self {
        Self::new()
    }
}
