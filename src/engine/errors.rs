use crate::engine::types::{AnnotationId, PageIndex};
use std::fmt;

/// Error codes reported by the document engine. They are carried through the
/// annotation layer untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EngineErrorCode {
    Unknown,
    NotFound,
    WrongFormat,
    Security,
    Cancelled,
    NotSupported,
    CantCreateAnnotation,
    CantUpdateAnnotation,
    CantRemoveAnnotation,
    CantRender,
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineErrorCode::Unknown => "Unknown",
            EngineErrorCode::NotFound => "NotFound",
            EngineErrorCode::WrongFormat => "WrongFormat",
            EngineErrorCode::Security => "Security",
            EngineErrorCode::Cancelled => "Cancelled",
            EngineErrorCode::NotSupported => "NotSupported",
            EngineErrorCode::CantCreateAnnotation => "CantCreateAnnotation",
            EngineErrorCode::CantUpdateAnnotation => "CantUpdateAnnotation",
            EngineErrorCode::CantRemoveAnnotation => "CantRemoveAnnotation",
            EngineErrorCode::CantRender => "CantRender",
        };
        write!(f, "{s}")
    }
}

/// Failure of a single engine task: an opaque code and message pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EngineFailure {
    pub code: EngineErrorCode,
    pub message: String,
}

impl EngineFailure {
    pub fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::NotFound, message)
    }
}

/// Coarse classification of an [`AnnotationError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Document, page, annotation, variant or mode is absent
    NotFound,
    /// A variant was activated that has no interaction mode bound to it
    Configuration,
    /// Malformed input (e.g. an unparsable variant key)
    Validation,
    /// Failure reported by the document engine
    Engine,
    /// The worker is gone
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("Document not found")]
    DocumentNotFound,

    #[error("Page {0} not found")]
    PageNotFound(PageIndex),

    #[error("Annotation {0} not found")]
    AnnotationNotFound(AnnotationId),

    #[error("No defaults found for variant: {0}")]
    VariantNotFound(String),

    #[error("Mode missing for variant {0}")]
    ModeMissing(String),

    #[error("Invalid variant key: {0}")]
    InvalidVariantKey(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineFailure),

    #[error("Annotation worker channel closed")]
    ChannelClosed,
}

impl AnnotationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnnotationError::DocumentNotFound
            | AnnotationError::PageNotFound(_)
            | AnnotationError::AnnotationNotFound(_)
            | AnnotationError::VariantNotFound(_) => ErrorKind::NotFound,
            AnnotationError::ModeMissing(_) => ErrorKind::Configuration,
            AnnotationError::InvalidVariantKey(_) => ErrorKind::Validation,
            AnnotationError::Engine(_) => ErrorKind::Engine,
            AnnotationError::ChannelClosed => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_display_has_code_and_message() {
        let f = EngineFailure::new(EngineErrorCode::CantCreateAnnotation, "page is locked");
        assert_eq!(f.to_string(), "CantCreateAnnotation: page is locked");
    }

    #[test]
    fn engine_failure_propagates_unmodified() {
        let f = EngineFailure::not_found("Page not found");
        let err: AnnotationError = f.clone().into();
        assert_eq!(err.kind(), ErrorKind::Engine);
        match err {
            AnnotationError::Engine(inner) => assert_eq!(inner, f),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(AnnotationError::DocumentNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(AnnotationError::PageNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(AnnotationError::VariantNotFound("ink".into()).kind(), ErrorKind::NotFound);
        assert_eq!(AnnotationError::ModeMissing("ink".into()).kind(), ErrorKind::Configuration);
        assert_eq!(AnnotationError::InvalidVariantKey("".into()).kind(), ErrorKind::Validation);
        assert_eq!(AnnotationError::ChannelClosed.kind(), ErrorKind::Internal);
    }
}
