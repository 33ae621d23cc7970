//! Core error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the reconciliation core.
///
/// Absence of an entity is never an error: lookups return `Ok(None)` and
/// callers treat it as a normal branch. Soft conditions (skipped low-quality
/// detections, recorded collisions, priority-losing upserts) are logged and
/// reported as `Ok` values.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected before any storage write.
    #[error("{0}")]
    Validation(String),

    /// Storage failures are propagated verbatim; the persisted state is in
    /// an unknown condition and callers must not continue silently.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by an external media collaborator (metadata
    /// extraction, JPEG conversion, thumbnailing, face detection).
    #[error("media processing failed: {0}")]
    Media(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        CoreError::Media(msg.into())
    }
}
