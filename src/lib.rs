//! Facegraph core
//!
//! Reconciliation of detected face markers with face clusters and named
//! subjects over an incrementally indexed photo library. Markers are
//! per-file face detections; faces are clusters of embedding vectors;
//! subjects are named people. The operations here keep those three layers
//! consistent across re-indexing, manual corrections and conflicting
//! automatic/manual labels.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod operations;
pub mod shared;

pub use config::{AppConfig, FaceConfig, IndexConfig};
pub use shared::errors::{CoreError, Result};
