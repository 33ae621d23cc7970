//! Domain types shared across operations.

pub mod crop;
pub mod detection;
pub mod embedding;
pub mod provenance;
