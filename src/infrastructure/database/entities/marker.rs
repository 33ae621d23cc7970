//! Marker entity: one detected face or label region within one file.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "markers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub file_uid: String,

    pub file_hash: String,

    /// 12-hex-char crop area code, see `domain::crop`.
    pub crop_area: String,

    /// `face`, `label` or empty for unknown.
    pub marker_type: String,

    /// How the marker itself was produced.
    pub marker_src: String,

    pub marker_name: String,

    pub marker_invalid: bool,

    pub marker_review: bool,

    pub subj_uid: String,

    /// Provenance of the subject link; manual strictly dominates automatic.
    pub subj_src: String,

    pub face_id: String,

    /// Distance to the linked face; -1 means unknown. Meaningless unless
    /// `face_id` is set.
    pub face_dist: f64,

    pub embeddings_json: String,

    pub landmarks_json: String,

    pub x: f32,

    pub y: f32,

    pub w: f32,

    pub h: f32,

    /// Derived quality score.
    pub q: i32,

    /// Absolute pixel size; -1 when unknown.
    pub size: i32,

    /// Detector score.
    pub score: i32,

    pub matched_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileUid",
        to = "super::file::Column::Id"
    )]
    File,
    #[sea_orm(
        belongs_to = "super::face::Entity",
        from = "Column::FaceId",
        to = "super::face::Column::Id"
    )]
    Face,
    #[sea_orm(
        belongs_to = "super::subject::Entity",
        from = "Column::SubjUid",
        to = "super::subject::Column::Id"
    )]
    Subject,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::face::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Face.def()
    }
}

impl Related<super::subject::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
