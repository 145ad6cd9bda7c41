//! Annotation plugin configuration.
//!
//! `AnnotationConfig` provides sensible defaults via [`Default`] and a fluent
//! [`AnnotationConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ```rust
//! use annotation_engine::AnnotationConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = AnnotationConfig::builder()
//!     .annotation_author("Jane Reviewer")
//!     .auto_commit(false)
//!     .build()?; // returns Result<AnnotationConfig, ConfigError>
//! assert_eq!(cfg.annotation_author.as_deref(), Some("Jane Reviewer"));
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `annotation_author`: default author stamped on created/updated annotations.
//! - `auto_commit`: flush to the engine after every mutation (default: `true`).
//! - `tools`: tool templates to register (default: [`default_tools()`]).
//! - `color_presets`: ordered colour palette offered to the UI.
//! - `channel_capacity`: capacity of the worker and notification channels.
//!
//! # Errors
//!
//! Builder validation returns [`ConfigError`] for a zero channel capacity,
//! duplicate variant keys, an opacity outside `0.0..=1.0` or an empty mode id.

use crate::engine::tools::{default_tools, ToolDefaults};
use crate::engine::types::Color;
use crate::engine::DEFAULT_CHANNEL_CAPACITY;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone)]
pub struct AnnotationConfig {
    pub annotation_author: Option<String>,
    pub auto_commit: bool,
    pub tools: Vec<ToolDefaults>,
    pub color_presets: Vec<Color>,
    pub channel_capacity: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            annotation_author: None,
            auto_commit: true,
            tools: default_tools(),
            color_presets: default_color_presets(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl AnnotationConfig {
    pub fn builder() -> AnnotationConfigBuilder {
        AnnotationConfigBuilder::default()
    }
}

pub fn default_color_presets() -> Vec<Color> {
    vec![
        Color::rgb(0xE4, 0x42, 0x34),
        Color::rgb(0xFF, 0x83, 0x16),
        Color::rgb(0xFF, 0xCD, 0x45),
        Color::rgb(0x5C, 0xC9, 0x6E),
        Color::rgb(0x25, 0xD2, 0xD1),
        Color::rgb(0x59, 0x7C, 0xE2),
        Color::rgb(0xC5, 0x44, 0xCE),
        Color::rgb(0x7D, 0x2E, 0x25),
    ]
}

/// Builder for [`AnnotationConfig`].
#[derive(Debug, Clone, Default)]
pub struct AnnotationConfigBuilder {
    inner: AnnotationConfig,
}

impl AnnotationConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut AnnotationConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn annotation_author<S: Into<String>>(self, author: S) -> Self { self.map(|c| c.annotation_author = Some(author.into())) }
    pub fn auto_commit(self, on: bool) -> Self { self.map(|c| c.auto_commit = on) }
    pub fn tools(self, tools: Vec<ToolDefaults>) -> Self { self.map(|c| c.tools = tools) }
    pub fn tool(self, tool: ToolDefaults) -> Self { self.map(|c| c.tools.push(tool)) }
    pub fn color_presets(self, colors: Vec<Color>) -> Self { self.map(|c| c.color_presets = colors) }
    pub fn channel_capacity(self, n: usize) -> Self { self.map(|c| c.channel_capacity = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut AnnotationConfig)) -> Self { self.map(f) }

    /// Validate and build the final config. Duplicate presets are dropped,
    /// keeping the first occurrence.
    pub fn build(mut self) -> Result<AnnotationConfig, ConfigError> {
        validate(&self.inner)?;
        let mut seen = HashSet::new();
        self.inner.color_presets.retain(|c| seen.insert(*c));
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroChannelCapacity,
    DuplicateVariant(String),
    InvalidOpacity { variant: String, opacity: f32 },
    EmptyModeId(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroChannelCapacity =>
                write!(f, "channel_capacity must be at least 1"),
            ConfigError::DuplicateVariant(key) =>
                write!(f, "tool variant {key} is defined more than once"),
            ConfigError::InvalidOpacity { variant, opacity } =>
                write!(f, "opacity {opacity} of tool {variant} is out of range (expected 0.0..=1.0)"),
            ConfigError::EmptyModeId(key) =>
                write!(f, "tool {key} has an empty interaction mode id"),
        }
    }
}
impl std::error::Error for ConfigError {}

fn validate(c: &AnnotationConfig) -> Result<(), ConfigError> {
    if c.channel_capacity == 0 {
        return Err(ConfigError::ZeroChannelCapacity);
    }
    let mut keys = HashSet::new();
    for tool in &c.tools {
        let key = tool.variant_key();
        if !(0.0..=1.0).contains(&tool.opacity) {
            return Err(ConfigError::InvalidOpacity { variant: key, opacity: tool.opacity });
        }
        if tool.interaction.mode.is_empty() {
            return Err(ConfigError::EmptyModeId(key));
        }
        if !keys.insert(key.clone()) {
            return Err(ConfigError::DuplicateVariant(key));
        }
    }
    Ok(())
}
