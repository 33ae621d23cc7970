//! Face entity: a cluster of embeddings representing one distinct visual
//! identity, independent of any named subject.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "faces")]
pub struct Model {
    /// Content-derived identifier (hash of the reference embedding).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub face_src: String,

    /// Linked subject; empty while the face is unnamed.
    pub subj_uid: String,

    /// Number of embedding samples the cluster was built from.
    pub samples: i32,

    /// Maximum distance of any sample from the reference embedding.
    pub sample_radius: f64,

    /// Cumulative count of detected naming collisions.
    pub collisions: i32,

    pub collision_radius: f64,

    /// Reference embedding (cluster center), serialized as JSON.
    pub embedding_json: String,

    pub matched_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subject::Entity",
        from = "Column::SubjUid",
        to = "super::subject::Column::Id"
    )]
    Subject,
    #[sea_orm(has_many = "super::marker::Entity")]
    Marker,
}

impl Related<super::subject::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subject.def()
    }
}

impl Related<super::marker::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Marker.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
