//! External services the annotation plugin collaborates with.
//!
//! None of them is required. They are handed to the plugin once, at
//! construction, through [`PluginServices`]; an absent service simply disables
//! the behavior that depends on it (no mode activation, no selection driven
//! text markup, no undo/redo).

pub mod history;
pub mod interaction;
pub mod selection;

use crate::engine::backend::EngineTask;
use crate::engine::commands::Command;
use crate::engine::tools::ModeDescriptor;
use crate::engine::types::{PageIndex, Rect};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Mode id the interaction manager falls back to when no tool is active.
pub const DEFAULT_MODE: &str = "pointerMode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub active_mode: String,
    pub previous_mode: Option<String>,
}

pub trait InteractionModeService: Send + Sync {
    fn register_mode(&self, mode: ModeDescriptor);
    fn activate(&self, mode_id: &str);
    fn activate_default_mode(&self);
    fn active_mode(&self) -> String;
    fn subscribe(&self) -> broadcast::Receiver<ModeChange>;
}

/// One page worth of selected text geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSegment {
    pub page_index: PageIndex,
    /// Bounding rect of all segments on the page
    pub rect: Rect,
    pub segment_rects: Vec<Rect>,
}

/// Emitted when the user finishes a text selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEnded {
    pub mode: Option<String>,
}

pub trait SelectionService: Send + Sync {
    fn enable_for_mode(&self, mode_id: &str);
    fn subscribe_end_selection(&self) -> broadcast::Receiver<SelectionEnded>;
    fn formatted_selection(&self) -> Vec<SelectionSegment>;
    /// Selected text, one entry per line
    fn selected_text(&self) -> EngineTask<Vec<String>>;
    fn clear(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryChange {
    pub topic: Option<String>,
}

pub trait HistoryService: Send + Sync {
    /// Executes `command` and records it under `topic`.
    fn register(&self, command: Command, topic: &str);
    fn subscribe(&self) -> broadcast::Receiver<HistoryChange>;
}

/// Optional collaborators, resolved once at wiring time.
#[derive(Clone, Default)]
pub struct PluginServices {
    pub interaction: Option<Arc<dyn InteractionModeService>>,
    pub selection: Option<Arc<dyn SelectionService>>,
    pub history: Option<Arc<dyn HistoryService>>,
}

impl Debug for PluginServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginServices")
            .field("interaction", &self.interaction.is_some())
            .field("selection", &self.selection.is_some())
            .field("history", &self.history.is_some())
            .finish()
    }
}

impl PluginServices {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_interaction(mut self, service: Arc<dyn InteractionModeService>) -> Self {
        self.interaction = Some(service);
        self
    }

    pub fn with_selection(mut self, service: Arc<dyn SelectionService>) -> Self {
        self.selection = Some(service);
        self
    }

    pub fn with_history(mut self, service: Arc<dyn HistoryService>) -> Self {
        self.history = Some(service);
        self
    }
}
