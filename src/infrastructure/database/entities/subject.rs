//! Subject entity: a named person or pet.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subjects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// `person`, `pet` or empty for unknown.
    pub subj_type: String,

    pub subj_src: String,

    /// Normalized form; unique across subjects.
    #[sea_orm(unique)]
    pub subj_slug: String,

    pub subj_name: String,

    pub subj_favorite: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::marker::Entity")]
    Marker,
    #[sea_orm(has_many = "super::face::Entity")]
    Face,
}

impl Related<super::marker::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Marker.def()
    }
}

impl Related<super::face::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Face.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
