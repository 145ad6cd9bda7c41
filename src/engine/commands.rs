//! Command/History bridge.
//!
//! With a history service every mutation becomes a reversible [`Command`]
//! registered under [`ANNOTATION_HISTORY_TOPIC`]; the history executes it and
//! reports the change, which in turn drives autocommit from the worker.
//! Without one, mutations are dispatched directly and a flush is requested
//! right away when autocommit is on.

use crate::engine::backend::CreateContext;
use crate::engine::errors::AnnotationError;
use crate::engine::events::WorkerCommand;
use crate::engine::geometry::build_patch;
use crate::engine::services::HistoryService;
use crate::engine::store::AnnotationStore;
use crate::engine::tracker::{AnnotationAction, CommitState};
use crate::engine::types::{AnnotationId, AnnotationObject, AnnotationPatch, PageIndex};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const ANNOTATION_HISTORY_TOPIC: &str = "annotations";

type Action = Box<dyn Fn() + Send + Sync>;

/// A reversible operation: `execute` then `undo` leaves the state as before.
pub struct Command {
    execute: Action,
    undo: Action,
}

impl Command {
    pub fn new(execute: impl Fn() + Send + Sync + 'static, undo: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            execute: Box::new(execute),
            undo: Box::new(undo),
        }
    }

    pub fn execute(&self) {
        (self.execute)()
    }

    pub fn undo(&self) {
        (self.undo)()
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").finish_non_exhaustive()
    }
}

/// Requests a flush from the worker when autocommit is on.
#[derive(Debug, Clone)]
pub struct FlushRequester {
    auto_commit: bool,
    tx: mpsc::Sender<WorkerCommand>,
}

impl FlushRequester {
    pub fn new(auto_commit: bool, tx: mpsc::Sender<WorkerCommand>) -> Self {
        Self { auto_commit, tx }
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn request(&self) {
        if !self.auto_commit {
            return;
        }
        match self.tx.try_send(WorkerCommand::Flush) {
            Ok(()) => log::trace!("flush requested"),
            // A full queue already holds flushes that will pick this change up.
            Err(mpsc::error::TrySendError::Full(_)) => log::debug!("flush queue full, coalescing"),
            Err(mpsc::error::TrySendError::Closed(_)) => log::warn!("annotation worker is gone, change stays pending"),
        }
    }
}

#[derive(Clone)]
pub struct HistoryBridge {
    store: Arc<AnnotationStore>,
    history: Option<Arc<dyn HistoryService>>,
    flush: FlushRequester,
}

impl Debug for HistoryBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBridge")
            .field("history", &self.history.is_some())
            .field("flush", &self.flush)
            .finish()
    }
}

impl HistoryBridge {
    pub fn new(store: Arc<AnnotationStore>, history: Option<Arc<dyn HistoryService>>, flush: FlushRequester) -> Self {
        Self { store, history, flush }
    }

    pub fn create(&self, object: AnnotationObject, context: Option<CreateContext>) -> AnnotationId {
        let id = object.id;
        let page_index = object.page_index;

        let store = Arc::clone(&self.store);
        let execute = move || {
            store.dispatch(AnnotationAction::Create(object.clone()));
            if let Some(context) = &context {
                store.set_context(id, context.clone());
            }
        };

        let store = Arc::clone(&self.store);
        let undo = move || {
            store.dispatch(AnnotationAction::Deselect);
            store.dispatch(AnnotationAction::Delete { page_index, id });
        };

        self.run(Command::new(execute, undo));
        id
    }

    /// `patch` gets its derived rect here; the undo restores exactly the keys
    /// of that final patch.
    pub fn update(&self, page_index: PageIndex, id: AnnotationId, patch: AnnotationPatch) -> Result<(), AnnotationError> {
        let original = self.live_object(id)?;
        let patch = build_patch(&original, &patch);
        let inverse = patch.inverse_against(&original);

        let store = Arc::clone(&self.store);
        let execute = move || {
            store.dispatch(AnnotationAction::Patch { page_index, id, patch: patch.clone() });
        };

        let store = Arc::clone(&self.store);
        let undo = move || {
            store.dispatch(AnnotationAction::Patch { page_index, id, patch: inverse.clone() });
        };

        self.run(Command::new(execute, undo));
        Ok(())
    }

    /// Undo re-creates the original object. A pending creation context is
    /// not restored.
    pub fn delete(&self, page_index: PageIndex, id: AnnotationId) -> Result<(), AnnotationError> {
        let original = self.live_object(id)?;

        let store = Arc::clone(&self.store);
        let execute = move || {
            if store.state().selection.map(|s| s.id) == Some(id) {
                store.dispatch(AnnotationAction::Deselect);
            }
            store.dispatch(AnnotationAction::Delete { page_index, id });
        };

        let store = Arc::clone(&self.store);
        let undo = move || {
            store.dispatch(AnnotationAction::Create(original.clone()));
        };

        self.run(Command::new(execute, undo));
        Ok(())
    }

    fn live_object(&self, id: AnnotationId) -> Result<AnnotationObject, AnnotationError> {
        self.store
            .state()
            .get(id)
            .filter(|t| t.commit_state != CommitState::Deleted)
            .map(|t| t.object.clone())
            .ok_or(AnnotationError::AnnotationNotFound(id))
    }

    fn run(&self, command: Command) {
        match &self.history {
            Some(history) => history.register(command, ANNOTATION_HISTORY_TOPIC),
            None => {
                command.execute();
                self.flush.request();
            }
        }
    }
}
