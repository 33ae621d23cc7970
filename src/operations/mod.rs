//! Core operations
//!
//! Each submodule owns one area of the reconciliation pipeline and exposes
//! async service functions over an injected [`sea_orm::DatabaseConnection`].

pub mod faces;
pub mod indexing;
pub mod markers;
pub mod subjects;
