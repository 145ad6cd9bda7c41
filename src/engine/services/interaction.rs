use crate::engine::services::{InteractionModeService, ModeChange, DEFAULT_MODE};
use crate::engine::tools::{ModeDescriptor, ModeScope};
use crate::engine::DEFAULT_CHANNEL_CAPACITY;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug)]
struct Inner {
    modes: HashMap<String, ModeDescriptor>,
    active: String,
}

/// In-memory interaction manager. Starts in [`DEFAULT_MODE`] and only
/// activates modes that were registered.
#[derive(Debug)]
pub struct InMemoryInteractionManager {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<ModeChange>,
}

impl Default for InMemoryInteractionManager {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let default_mode = ModeDescriptor {
            id: DEFAULT_MODE.to_string(),
            scope: ModeScope::Global,
            exclusive: false,
            cursor: None,
        };
        Self {
            inner: Mutex::new(Inner {
                modes: HashMap::from([(DEFAULT_MODE.to_string(), default_mode)]),
                active: DEFAULT_MODE.to_string(),
            }),
            tx,
        }
    }
}

impl InMemoryInteractionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_mode(&self, mode_id: &str) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).modes.contains_key(mode_id)
    }

    fn switch_to(&self, mode_id: &str) {
        let change = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !inner.modes.contains_key(mode_id) {
                log::warn!("cannot activate unknown interaction mode {mode_id}");
                return;
            }
            if inner.active == mode_id {
                return;
            }
            let previous = std::mem::replace(&mut inner.active, mode_id.to_string());
            ModeChange {
                active_mode: mode_id.to_string(),
                previous_mode: Some(previous),
            }
        };
        // No receivers is fine.
        let _ = self.tx.send(change);
    }
}

impl InteractionModeService for InMemoryInteractionManager {
    fn register_mode(&self, mode: ModeDescriptor) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.modes.insert(mode.id.clone(), mode);
    }

    fn activate(&self, mode_id: &str) {
        self.switch_to(mode_id);
    }

    fn activate_default_mode(&self) {
        self.switch_to(DEFAULT_MODE);
    }

    fn active_mode(&self) -> String {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).active.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ModeChange> {
        self.tx.subscribe()
    }
}
