//! Shared utilities

pub mod errors;
pub mod text;
pub mod uid;
