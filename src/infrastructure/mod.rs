//! Infrastructure: persistence.

pub mod database;
