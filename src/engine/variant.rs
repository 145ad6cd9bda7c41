//! Variant keys.
//!
//! A variant identifies a subtype plus an optional creation intent, encoded as
//! `"<subtype>"` or `"<subtype>_<intent>"` (e.g. `"ink_highlighter"`).

use crate::engine::errors::AnnotationError;
use crate::engine::types::AnnotationSubtype;

pub fn make_variant_key(subtype: AnnotationSubtype, intent: Option<&str>) -> String {
    match intent {
        Some(intent) if !intent.is_empty() => format!("{}_{}", subtype.as_str(), intent),
        _ => subtype.as_str().to_string(),
    }
}

pub fn parse_variant_key(key: &str) -> Result<(AnnotationSubtype, Option<String>), AnnotationError> {
    let (subtype, intent) = match key.split_once('_') {
        Some((s, i)) => (s, Some(i)),
        None => (key, None),
    };

    if matches!(intent, Some("")) {
        return Err(AnnotationError::InvalidVariantKey(key.to_string()));
    }

    let subtype = subtype
        .parse::<AnnotationSubtype>()
        .map_err(|_| AnnotationError::InvalidVariantKey(key.to_string()))?;

    Ok((subtype, intent.map(str::to_string)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_without_intent() {
        assert_eq!(make_variant_key(AnnotationSubtype::Highlight, None), "highlight");
        assert_eq!(make_variant_key(AnnotationSubtype::Highlight, Some("")), "highlight");
        assert_eq!(parse_variant_key("highlight").unwrap(), (AnnotationSubtype::Highlight, None));
    }

    #[test]
    fn keys_with_intent() {
        let key = make_variant_key(AnnotationSubtype::Ink, Some("highlighter"));
        assert_eq!(key, "ink_highlighter");
        assert_eq!(
            parse_variant_key(&key).unwrap(),
            (AnnotationSubtype::Ink, Some("highlighter".to_string()))
        );
    }

    #[test]
    fn bad_keys_are_rejected() {
        assert!(matches!(parse_variant_key("pencil"), Err(AnnotationError::InvalidVariantKey(_))));
        assert!(matches!(parse_variant_key("ink_"), Err(AnnotationError::InvalidVariantKey(_))));
        assert!(parse_variant_key("").is_err());
    }
}
