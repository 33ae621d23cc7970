//! Sea-ORM entity definitions
//!
//! These map the reconciliation domain to database tables. Identifier
//! columns use empty-string sentinels instead of NULL so that conditional
//! claim/cascade updates can filter on the default value directly.

pub mod face;
pub mod file;
pub mod marker;
pub mod photo;
pub mod subject;

// Re-export all entities
pub use face::Entity as Face;
pub use file::Entity as File;
pub use marker::Entity as Marker;
pub use photo::Entity as Photo;
pub use subject::Entity as Subject;
