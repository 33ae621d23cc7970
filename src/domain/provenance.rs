//! Source provenance tags and their priority ordering.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a field's value was produced. Stored as its string form; the empty
/// string is the unknown/default provenance.
///
/// The relative priority ordering is a hard contract for the upsert rule:
/// lower-priority re-detections never clobber higher-priority manual or
/// metadata values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Src {
    #[default]
    #[strum(serialize = "")]
    #[serde(rename = "")]
    Unknown,
    /// Assigned by automatic clustering.
    #[strum(serialize = "auto")]
    Auto,
    /// Produced by image face detection.
    #[strum(serialize = "image")]
    Image,
    /// Extracted from embedded file metadata.
    #[strum(serialize = "meta")]
    Meta,
    /// Entered by a human.
    #[strum(serialize = "manual")]
    Manual,
}

impl Src {
    /// Ascending write priority; ties go to the later writer.
    pub fn priority(self) -> u8 {
        match self {
            Src::Unknown => 0,
            Src::Auto => 1,
            Src::Image => 4,
            Src::Meta => 8,
            Src::Manual => 16,
        }
    }

    /// Automatic provenance never drives naming or collision checks; the
    /// unknown default counts as automatic.
    pub fn is_automatic(self) -> bool {
        matches!(self, Src::Unknown | Src::Auto)
    }

    /// Parses a persisted provenance column, treating anything unexpected
    /// as unknown.
    pub fn from_db(s: &str) -> Src {
        s.parse().unwrap_or(Src::Unknown)
    }
}

/// What kind of region a marker describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    #[default]
    #[strum(serialize = "")]
    #[serde(rename = "")]
    Unknown,
    #[strum(serialize = "face")]
    Face,
    #[strum(serialize = "label")]
    Label,
}

impl MarkerKind {
    pub fn from_db(s: &str) -> MarkerKind {
        s.parse().unwrap_or(MarkerKind::Unknown)
    }
}

/// What kind of entity a subject names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    #[default]
    #[strum(serialize = "")]
    #[serde(rename = "")]
    Unknown,
    #[strum(serialize = "person")]
    Person,
    #[strum(serialize = "pet")]
    Pet,
}
