//! Tools and the variant/mode registry.
//!
//! Every tool is described by a [`ToolDefaults`] template keyed by its variant
//! key. Registering a tool binds the variant to an interaction mode in both
//! directions so that mode changes reported by the interaction manager can be
//! resolved back to the active variant.

use crate::engine::services::{InteractionModeService, SelectionService};
use crate::engine::types::{AnnotationSubtype, BlendMode, Color};
use crate::engine::variant::make_variant_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interaction mode a tool activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionBinding {
    pub mode: String,
    pub exclusive: bool,
    pub cursor: Option<String>,
}

/// Creation template of a tool. Copied into new annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefaults {
    pub name: String,
    pub subtype: AnnotationSubtype,
    pub intent: Option<String>,
    pub interaction: InteractionBinding,
    /// Capture text selections while this tool's mode is active
    pub text_selection: bool,
    pub color: Color,
    pub opacity: f32,
    pub blend_mode: Option<BlendMode>,
    pub stroke_width: Option<f32>,
}

impl ToolDefaults {
    pub fn variant_key(&self) -> String {
        make_variant_key(self.subtype, self.intent.as_deref())
    }

    pub fn is_text_markup(&self) -> bool {
        self.subtype.is_text_markup()
    }

    /// Copy of these defaults with the rendering fields of `patch` applied.
    pub fn apply(&self, patch: &ToolDefaultsPatch) -> ToolDefaults {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(color) = patch.color {
            next.color = color;
        }
        if let Some(opacity) = patch.opacity {
            next.opacity = opacity;
        }
        if let Some(blend_mode) = patch.blend_mode {
            next.blend_mode = Some(blend_mode);
        }
        if let Some(stroke_width) = patch.stroke_width {
            next.stroke_width = Some(stroke_width);
        }
        next
    }
}

/// Rendering defaults a caller may change at runtime. Subtype, intent and the
/// mode binding are fixed at registration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolDefaultsPatch {
    pub name: Option<String>,
    pub color: Option<Color>,
    pub opacity: Option<f32>,
    pub blend_mode: Option<BlendMode>,
    pub stroke_width: Option<f32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeScope {
    Page,
    Global,
}

/// Interaction mode as registered with the interaction manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDescriptor {
    pub id: String,
    pub scope: ModeScope,
    pub exclusive: bool,
    pub cursor: Option<String>,
}

impl From<&InteractionBinding> for ModeDescriptor {
    fn from(binding: &InteractionBinding) -> Self {
        Self {
            id: binding.mode.clone(),
            scope: ModeScope::Page,
            exclusive: binding.exclusive,
            cursor: binding.cursor.clone(),
        }
    }
}

/// Bidirectional `variant key <-> interaction mode id` map.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    mode_by_variant: HashMap<String, String>,
    variant_by_mode: HashMap<String, String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the tool's mode with the interaction manager (and text
    /// selection capture, when the tool asks for it) and records the binding.
    pub fn register(
        &mut self,
        variant_key: &str,
        defaults: &ToolDefaults,
        interaction: Option<&dyn InteractionModeService>,
        selection: Option<&dyn SelectionService>,
    ) {
        let descriptor = ModeDescriptor::from(&defaults.interaction);

        if let Some(im) = interaction {
            im.register_mode(descriptor.clone());
        }
        if defaults.text_selection {
            if let Some(sel) = selection {
                sel.enable_for_mode(&descriptor.id);
            }
        }

        log::debug!("registered tool {variant_key} on mode {}", descriptor.id);
        self.mode_by_variant.insert(variant_key.to_string(), descriptor.id.clone());
        self.variant_by_mode.insert(descriptor.id, variant_key.to_string());
    }

    pub fn mode_for(&self, variant_key: &str) -> Option<&str> {
        self.mode_by_variant.get(variant_key).map(String::as_str)
    }

    pub fn variant_for(&self, mode_id: &str) -> Option<&str> {
        self.variant_by_mode.get(mode_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mode_by_variant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mode_by_variant.is_empty()
    }
}

fn tool(
    name: &str,
    subtype: AnnotationSubtype,
    intent: Option<&str>,
    cursor: &str,
    color: Color,
) -> ToolDefaults {
    let mode = make_variant_key(subtype, intent);
    ToolDefaults {
        name: name.to_string(),
        subtype,
        intent: intent.map(str::to_string),
        interaction: InteractionBinding {
            mode,
            exclusive: false,
            cursor: Some(cursor.to_string()),
        },
        text_selection: subtype.is_text_markup(),
        color,
        opacity: 1.0,
        blend_mode: None,
        stroke_width: None,
    }
}

pub const HIGHLIGHT_YELLOW: Color = Color::rgb(0xFF, 0xCD, 0x45);
pub const MARKUP_RED: Color = Color::rgb(0xE4, 0x42, 0x34);

/// Built-in tool set.
pub fn default_tools() -> Vec<ToolDefaults> {
    use AnnotationSubtype::*;

    let mut highlight = tool("Highlight", Highlight, None, "text", HIGHLIGHT_YELLOW);
    highlight.blend_mode = Some(BlendMode::Multiply);

    let mut ink = tool("Ink", Ink, None, "crosshair", MARKUP_RED);
    ink.stroke_width = Some(6.0);

    let mut ink_highlighter = tool("Ink Highlighter", Ink, Some("highlighter"), "crosshair", HIGHLIGHT_YELLOW);
    ink_highlighter.opacity = 0.5;
    ink_highlighter.stroke_width = Some(14.0);
    ink_highlighter.blend_mode = Some(BlendMode::Multiply);

    let mut line_arrow = tool("Arrow", Line, Some("arrow"), "crosshair", MARKUP_RED);
    line_arrow.stroke_width = Some(2.0);

    let mut shapes: Vec<ToolDefaults> = [
        ("Circle", Circle, None),
        ("Square", Square, None),
        ("Line", Line, None),
        ("Polygon", Polygon, None),
        ("Polyline", Polyline, None),
    ]
    .into_iter()
    .map(|(name, subtype, intent)| {
        let mut t = tool(name, subtype, intent, "crosshair", MARKUP_RED);
        t.stroke_width = Some(2.0);
        t
    })
    .collect();

    let mut tools = vec![
        highlight,
        tool("Underline", Underline, None, "text", MARKUP_RED),
        tool("Strikeout", Strikeout, None, "text", MARKUP_RED),
        tool("Squiggly", Squiggly, None, "text", MARKUP_RED),
        ink,
        ink_highlighter,
        line_arrow,
    ];
    tools.append(&mut shapes);
    tools.push(tool("Free Text", FreeText, None, "crosshair", Color::rgb(0, 0, 0)));
    tools.push(tool("Stamp", Stamp, None, "copy", Color::rgb(0, 0, 0)));
    tools
}
