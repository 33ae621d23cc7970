//! File entity: one indexed file belonging to a logical photo.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub photo_uid: String,

    pub file_name: String,

    pub file_hash: String,

    pub file_size: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::photo::Entity",
        from = "Column::PhotoUid",
        to = "super::photo::Column::Id"
    )]
    Photo,
    #[sea_orm(has_many = "super::marker::Entity")]
    Marker,
}

impl Related<super::photo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Photo.def()
    }
}

impl Related<super::marker::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Marker.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
