//! Annotation state tracking and engine synchronisation.
//!
//! The plugin keeps a local, optimistic view of every annotation of the open
//! document. Edits apply to that view immediately and are marked with a
//! [`CommitState`]. A commit pushes the pending entries to the document
//! engine ([`AnnotationBackend`]) and folds the outcome back into the state.
//!
//! # Concepts
//!
//! - **Tracker**: the reducer in [`tracker`] owns every state transition.
//!   [`AnnotationStore`] holds the current snapshot and broadcasts each new one.
//! - **Commit**: [`CommitOrchestrator`] issues creations, updates and removals
//!   concurrently, waits for all of them and settles each entry on its own.
//! - **Tools**: every annotation tool is a [`ToolDefaults`] addressed by its
//!   variant key (`subtype` or `subtype_intent`), bound to an interaction mode.
//! - **Services**: interaction modes, text selection and undo history are
//!   optional collaborators handed in through [`PluginServices`].
//!
//! # Available types
//!
//! - [`AnnotationPlugin`]: wiring; spawns the background worker.
//! - [`AnnotationHandle`]: capability surface for UI layers and other plugins.
//! - [`AnnotationConfig`]: configuration, built with [`AnnotationConfigBuilder`].
//! - [`InMemoryBackend`]: engine backend keeping annotations in memory.

pub mod backend;
pub mod commands;
pub mod commit;
pub mod config;
pub mod document;
pub mod errors;
pub mod events;
pub mod geometry;
pub mod handle;
pub mod plugin;
pub mod services;
pub mod store;
pub mod tools;
pub mod tracker;
pub mod types;
pub mod variant;
pub mod worker;

/// Capacity of command and event channels unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub use backend::in_memory::{BackendCall, CallKind, InMemoryBackend};
pub use backend::{AnnotationBackend, AppearanceMode, CreateContext, EngineTask, ImageData, RenderOptions};
pub use commit::{CommitItem, CommitOperation, CommitOrchestrator, CommitReport};
pub use config::{AnnotationConfig, AnnotationConfigBuilder, ConfigError};
pub use document::{DocumentId, PdfDocument, PdfPage};
pub use errors::{AnnotationError, EngineErrorCode, EngineFailure, ErrorKind};
pub use events::ActiveTool;
pub use handle::AnnotationHandle;
pub use plugin::AnnotationPlugin;
pub use services::history::InMemoryHistory;
pub use services::interaction::InMemoryInteractionManager;
pub use services::selection::InMemorySelection;
pub use services::{
    HistoryService, InteractionModeService, PluginServices, SelectionSegment, SelectionService, DEFAULT_MODE,
};
pub use store::AnnotationStore;
pub use tools::{default_tools, InteractionBinding, ToolDefaults, ToolDefaultsPatch};
pub use tracker::{AnnotationState, CommitState, TrackedAnnotation};
pub use types::{
    AnnotationFlags, AnnotationId, AnnotationObject, AnnotationPatch, AnnotationSubtype, BlendMode, Color, PageIndex,
    Position, Rect, Size,
};
pub use variant::{make_variant_key, parse_variant_key};
