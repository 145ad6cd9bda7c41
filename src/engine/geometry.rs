//! Derived bounding geometry.
//!
//! The `rect` of most annotation subtypes is not set independently: it is the
//! bounding box of the ink strokes, vertices or text segments. Patches that do
//! not carry an explicit `rect` get one recomputed from the merged object.

use crate::engine::types::{AnnotationObject, AnnotationPatch, AnnotationSubtype, Rect};

/// Bounding rect of the geometry of `object`. Falls back to the current
/// `rect` when the subtype has no derived geometry or the geometry is empty.
pub fn derive_rect(object: &AnnotationObject) -> Rect {
    let half_stroke = object.stroke_width.max(0.0) / 2.0;

    let derived = match object.subtype {
        AnnotationSubtype::Ink => {
            Rect::from_points(object.ink_list.iter().flatten()).map(|r| r.inflate(half_stroke))
        }
        AnnotationSubtype::Line | AnnotationSubtype::Polygon | AnnotationSubtype::Polyline => {
            Rect::from_points(&object.vertices).map(|r| r.inflate(half_stroke))
        }
        s if s.is_text_markup() => Rect::union_all(&object.segment_rects),
        _ => None,
    };

    derived.unwrap_or(object.rect)
}

/// Final patch sent to the tracker: an explicit `rect` in `patch` wins,
/// otherwise the rect is derived from `original` merged with `patch`.
pub fn build_patch(original: &AnnotationObject, patch: &AnnotationPatch) -> AnnotationPatch {
    if patch.rect.is_some() {
        return patch.clone();
    }

    let mut merged = original.clone();
    patch.apply_to(&mut merged);

    AnnotationPatch {
        rect: Some(derive_rect(&merged)),
        ..patch.clone()
    }
}
