//! Annotation data model.
//!
//! All coordinates are page-local, in PDF points. The model is deliberately
//! flat: every subtype shares [`AnnotationObject`] and only reads the fields
//! that apply to it (ink strokes for ink, vertices for lines and polygons,
//! segment rects for text markup).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use uuid::Uuid;

/// Zero-based page index inside a document.
pub type PageIndex = u32;

/// A unique identifier for an annotation, represented as a UUID. Stable for
/// the lifetime of the annotation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AnnotationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis aligned rectangle: top-left origin plus size.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Position,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Position::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn max_x(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f32 {
        self.origin.y + self.size.height
    }

    /// Smallest rect containing every point, or `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Position>) -> Option<Rect> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.origin.x.min(other.origin.x);
        let min_y = self.origin.y.min(other.origin.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Union of all rects, or `None` for an empty input.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc: Option<Rect>, r| match acc {
            Some(acc) => Some(acc.union(r)),
            None => Some(*r),
        })
    }

    /// Grow the rect by `amount` on every side.
    pub fn inflate(&self, amount: f32) -> Rect {
        Rect::new(
            self.origin.x - amount,
            self.origin.y - amount,
            self.size.width + amount * 2.0,
            self.size.height + amount * 2.0,
        )
    }
}

/// RGB color, serialized as `#RRGGBB`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

/// PDF annotation subtypes handled by the annotation layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSubtype {
    Text,
    FreeText,
    Line,
    Square,
    Circle,
    Polygon,
    Polyline,
    Highlight,
    Underline,
    Squiggly,
    Strikeout,
    Stamp,
    Ink,
}

impl AnnotationSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationSubtype::Text => "text",
            AnnotationSubtype::FreeText => "freetext",
            AnnotationSubtype::Line => "line",
            AnnotationSubtype::Square => "square",
            AnnotationSubtype::Circle => "circle",
            AnnotationSubtype::Polygon => "polygon",
            AnnotationSubtype::Polyline => "polyline",
            AnnotationSubtype::Highlight => "highlight",
            AnnotationSubtype::Underline => "underline",
            AnnotationSubtype::Squiggly => "squiggly",
            AnnotationSubtype::Strikeout => "strikeout",
            AnnotationSubtype::Stamp => "stamp",
            AnnotationSubtype::Ink => "ink",
        }
    }

    /// Highlight, underline, squiggly and strikeout are created from a text selection.
    pub fn is_text_markup(&self) -> bool {
        matches!(
            self,
            AnnotationSubtype::Highlight
                | AnnotationSubtype::Underline
                | AnnotationSubtype::Squiggly
                | AnnotationSubtype::Strikeout
        )
    }
}

impl Display for AnnotationSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnnotationSubtype {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => AnnotationSubtype::Text,
            "freetext" => AnnotationSubtype::FreeText,
            "line" => AnnotationSubtype::Line,
            "square" => AnnotationSubtype::Square,
            "circle" => AnnotationSubtype::Circle,
            "polygon" => AnnotationSubtype::Polygon,
            "polyline" => AnnotationSubtype::Polyline,
            "highlight" => AnnotationSubtype::Highlight,
            "underline" => AnnotationSubtype::Underline,
            "squiggly" => AnnotationSubtype::Squiggly,
            "strikeout" => AnnotationSubtype::Strikeout,
            "stamp" => AnnotationSubtype::Stamp,
            "ink" => AnnotationSubtype::Ink,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

bitflags! {
    /// Annotation flags as defined by the PDF specification (table 165).
    #[derive(Serialize, Deserialize)]
    pub struct AnnotationFlags: u32 {
        const INVISIBLE       = 1 << 0;
        const HIDDEN          = 1 << 1;
        const PRINT           = 1 << 2;
        const NO_ZOOM         = 1 << 3;
        const NO_ROTATE       = 1 << 4;
        const NO_VIEW         = 1 << 5;
        const READ_ONLY       = 1 << 6;
        const LOCKED          = 1 << 7;
        const TOGGLE_NO_VIEW  = 1 << 8;
        const LOCKED_CONTENTS = 1 << 9;
    }
}

/// A single annotation as exchanged with the document engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationObject {
    pub id: AnnotationId,
    pub page_index: PageIndex,
    pub subtype: AnnotationSubtype,
    /// Bounding box. Derived from the geometry for most subtypes.
    pub rect: Rect,
    /// Per-line quads of a text markup annotation
    pub segment_rects: Vec<Rect>,
    /// Vertices of lines, polygons and polylines
    pub vertices: Vec<Position>,
    /// Strokes of an ink annotation
    pub ink_list: Vec<Vec<Position>>,
    pub stroke_width: f32,
    pub color: Option<Color>,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub author: Option<String>,
    pub contents: Option<String>,
    pub flags: AnnotationFlags,
    /// Free-form payload (e.g. the text a highlight was created from)
    pub custom: Option<serde_json::Value>,
}

impl AnnotationObject {
    pub fn new(page_index: PageIndex, subtype: AnnotationSubtype, rect: Rect) -> Self {
        Self {
            id: AnnotationId::new(),
            page_index,
            subtype,
            rect,
            segment_rects: Vec::new(),
            vertices: Vec::new(),
            ink_list: Vec::new(),
            stroke_width: 1.0,
            color: None,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            author: None,
            contents: None,
            flags: AnnotationFlags::empty(),
            custom: None,
        }
    }

    pub fn with_id(mut self, id: AnnotationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_segments(mut self, segment_rects: Vec<Rect>) -> Self {
        self.segment_rects = segment_rects;
        self
    }

    pub fn with_vertices(mut self, vertices: Vec<Position>) -> Self {
        self.vertices = vertices;
        self
    }

    pub fn with_ink(mut self, ink_list: Vec<Vec<Position>>) -> Self {
        self.ink_list = ink_list;
        self
    }
}

/// Partial update of an [`AnnotationObject`]. `None` leaves a field alone;
/// for optional fields `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationPatch {
    pub rect: Option<Rect>,
    pub segment_rects: Option<Vec<Rect>>,
    pub vertices: Option<Vec<Position>>,
    pub ink_list: Option<Vec<Vec<Position>>>,
    pub stroke_width: Option<f32>,
    pub color: Option<Option<Color>>,
    pub opacity: Option<f32>,
    pub blend_mode: Option<BlendMode>,
    pub author: Option<Option<String>>,
    pub contents: Option<Option<String>>,
    pub flags: Option<AnnotationFlags>,
    pub custom: Option<Option<serde_json::Value>>,
}

impl AnnotationPatch {
    pub fn is_empty(&self) -> bool {
        *self == AnnotationPatch::default()
    }

    /// Merge the patch into `object`.
    pub fn apply_to(&self, object: &mut AnnotationObject) {
        if let Some(v) = &self.rect {
            object.rect = *v;
        }
        if let Some(v) = &self.segment_rects {
            object.segment_rects = v.clone();
        }
        if let Some(v) = &self.vertices {
            object.vertices = v.clone();
        }
        if let Some(v) = &self.ink_list {
            object.ink_list = v.clone();
        }
        if let Some(v) = self.stroke_width {
            object.stroke_width = v;
        }
        if let Some(v) = &self.color {
            object.color = *v;
        }
        if let Some(v) = self.opacity {
            object.opacity = v;
        }
        if let Some(v) = self.blend_mode {
            object.blend_mode = v;
        }
        if let Some(v) = &self.author {
            object.author = v.clone();
        }
        if let Some(v) = &self.contents {
            object.contents = v.clone();
        }
        if let Some(v) = self.flags {
            object.flags = v;
        }
        if let Some(v) = &self.custom {
            object.custom = v.clone();
        }
    }

    /// The values `original` holds for exactly the keys this patch sets.
    /// Applying the result after `self` restores `original` for those keys.
    pub fn inverse_against(&self, original: &AnnotationObject) -> AnnotationPatch {
        AnnotationPatch {
            rect: self.rect.map(|_| original.rect),
            segment_rects: self.segment_rects.as_ref().map(|_| original.segment_rects.clone()),
            vertices: self.vertices.as_ref().map(|_| original.vertices.clone()),
            ink_list: self.ink_list.as_ref().map(|_| original.ink_list.clone()),
            stroke_width: self.stroke_width.map(|_| original.stroke_width),
            color: self.color.map(|_| original.color),
            opacity: self.opacity.map(|_| original.opacity),
            blend_mode: self.blend_mode.map(|_| original.blend_mode),
            author: self.author.as_ref().map(|_| original.author.clone()),
            contents: self.contents.as_ref().map(|_| original.contents.clone()),
            flags: self.flags.map(|_| original.flags),
            custom: self.custom.as_ref().map(|_| original.custom.clone()),
        }
    }
}
