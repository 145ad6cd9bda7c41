use crate::engine::commands::Command;
use crate::engine::services::{HistoryChange, HistoryService};
use crate::engine::DEFAULT_CHANNEL_CAPACITY;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

type Entry = (Arc<Command>, String);

#[derive(Default)]
struct Stacks {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
}

/// Linear undo/redo history. Every register, undo and redo emits a
/// [`HistoryChange`] for the topic of the affected command.
pub struct InMemoryHistory {
    stacks: Mutex<Stacks>,
    tx: broadcast::Sender<HistoryChange>,
}

impl std::fmt::Debug for InMemoryHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryHistory")
            .field("undo", &stacks.undo.len())
            .field("redo", &stacks.redo.len())
            .finish()
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            stacks: Mutex::new(Stacks::default()),
            tx,
        }
    }
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.stacks.lock().unwrap_or_else(PoisonError::into_inner).undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.stacks.lock().unwrap_or_else(PoisonError::into_inner).redo.is_empty()
    }

    /// Undo the most recent command. Returns false when there is nothing to undo.
    pub fn undo(&self) -> bool {
        let entry = self.stacks.lock().unwrap_or_else(PoisonError::into_inner).undo.pop();
        let Some((command, topic)) = entry else {
            return false;
        };

        // The lock is released while the command runs; commands dispatch into
        // the annotation store.
        command.undo();
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .redo
            .push((command, topic.clone()));
        self.publish(topic);
        true
    }

    pub fn redo(&self) -> bool {
        let entry = self.stacks.lock().unwrap_or_else(PoisonError::into_inner).redo.pop();
        let Some((command, topic)) = entry else {
            return false;
        };

        command.execute();
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .undo
            .push((command, topic.clone()));
        self.publish(topic);
        true
    }

    fn publish(&self, topic: String) {
        let _ = self.tx.send(HistoryChange { topic: Some(topic) });
    }
}

impl HistoryService for InMemoryHistory {
    fn register(&self, command: Command, topic: &str) {
        let command = Arc::new(command);
        command.execute();
        {
            let mut stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
            stacks.undo.push((command, topic.to_string()));
            stacks.redo.clear();
        }
        self.publish(topic.to_string());
    }

    fn subscribe(&self) -> broadcast::Receiver<HistoryChange> {
        self.tx.subscribe()
    }
}
