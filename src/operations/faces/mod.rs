//! Face cluster operations.
//!
//! A face is a cluster of embedding samples represented by its reference
//! embedding (the sample center). Cluster ids are content-derived from the
//! reference embedding, so re-clustering the same samples converges on the
//! same row. Collisions, two different named subjects claiming the same
//! cluster, shrink the cluster's trusted radius instead of picking a winner.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::FaceConfig;
use crate::domain::embedding::{Embedding, Embeddings};
use crate::domain::provenance::{MarkerKind, Src};
use crate::infrastructure::database::entities::{face, file, marker, photo};
use crate::operations::markers::Marker;
use crate::shared::errors::{CoreError, Result};

/// Collision radius is never revised below this distance.
pub const COLLISION_RADIUS_FLOOR: f64 = 0.1;

/// Length of a content-derived face id.
pub const FACE_ID_LEN: usize = 32;

/// Parses the persisted reference embedding. An empty column is an empty
/// embedding, not an error.
pub fn embedding(f: &face::Model) -> Result<Embedding> {
    if f.embedding_json.trim().is_empty() {
        return Ok(Embedding::default());
    }

    Ok(serde_json::from_str(&f.embedding_json)?)
}

/// Derives the cluster id from the reference embedding so equal clusters
/// get equal ids regardless of when or where they were computed.
pub fn face_id(reference: &Embedding) -> String {
    let mut hasher = Sha256::new();

    for v in &reference.0 {
        hasher.update(v.to_le_bytes());
    }

    let digest = hex::encode(hasher.finalize());

    digest[..FACE_ID_LEN].to_string()
}

/// Builds a new face cluster from a set of embedding samples. Returns
/// `None` when the samples contain no usable vectors.
pub fn new_face(subj_uid: &str, src: Src, embeddings: &Embeddings) -> Option<face::Model> {
    let center = embeddings.average()?;

    let mut sample_radius = 0.0f64;
    let mut samples = 0i32;

    for e in &embeddings.0 {
        if e.len() != center.len() {
            continue;
        }

        let d = e.euclidean_distance(&center);

        if d > sample_radius {
            sample_radius = d;
        }

        samples += 1;
    }

    let embedding_json = serde_json::to_string(&center).ok()?;
    let now = Utc::now();

    Some(face::Model {
        id: face_id(&center),
        face_src: src.to_string(),
        subj_uid: subj_uid.to_string(),
        samples,
        sample_radius,
        collisions: 0,
        collision_radius: 0.0,
        embedding_json,
        matched_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Inserts the face unless a cluster with the same id already exists, then
/// returns the stored row either way.
pub async fn first_or_create(db: &DatabaseConnection, f: face::Model) -> Result<face::Model> {
    let id = f.id.clone();

    face::Entity::insert(f.into_active_model().reset_all())
        .on_conflict(OnConflict::column(face::Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    face::Entity::find_by_id(id.clone())
        .one(db)
        .await?
        .ok_or_else(|| CoreError::validation(format!("face {id} not found after insert")))
}

pub async fn find_face(db: &DatabaseConnection, id: &str) -> Result<Option<face::Model>> {
    if id.is_empty() {
        return Ok(None);
    }

    Ok(face::Entity::find_by_id(id).one(db).await?)
}

/// Links the face to a subject. The stored row and the in-memory model are
/// both updated.
pub async fn set_subject_uid(
    db: &DatabaseConnection,
    f: &mut face::Model,
    subj_uid: &str,
) -> Result<()> {
    if subj_uid.is_empty() {
        return Err(CoreError::validation("face: subject uid must not be empty"));
    }

    if f.id.is_empty() {
        return Err(CoreError::validation("face: id must not be empty"));
    }

    if f.subj_uid == subj_uid {
        return Ok(());
    }

    face::Entity::update_many()
        .col_expr(face::Column::SubjUid, Expr::value(subj_uid))
        .filter(face::Column::Id.eq(f.id.clone()))
        .exec(db)
        .await?;

    f.subj_uid = subj_uid.to_string();

    Ok(())
}

/// Links the face to a subject only while it has none, so concurrent
/// claims cannot overwrite each other. Reports whether this call won.
pub async fn claim_subject(
    db: &DatabaseConnection,
    face_id: &str,
    subj_uid: &str,
) -> Result<bool> {
    if face_id.is_empty() || subj_uid.is_empty() {
        return Ok(false);
    }

    let res = face::Entity::update_many()
        .col_expr(face::Column::SubjUid, Expr::value(subj_uid))
        .filter(face::Column::Id.eq(face_id))
        .filter(face::Column::SubjUid.eq(""))
        .exec(db)
        .await?;

    Ok(res.rows_affected > 0)
}

/// Records a naming collision against this cluster: the collision counter
/// is incremented in SQL, the trusted radius is revised down to just under
/// the conflicting distance (never below [`COLLISION_RADIUS_FLOOR`]) and
/// the match timestamp is cleared so affected markers get re-evaluated.
///
/// Reports `false` without touching the row when the conflicting samples
/// share no comparable vectors with the reference embedding.
pub async fn resolve_collision(
    db: &DatabaseConnection,
    f: &mut face::Model,
    embeddings: &Embeddings,
) -> Result<bool> {
    if f.id.is_empty() {
        return Err(CoreError::validation("face: id must not be empty"));
    }

    let reference = embedding(f)?;

    if reference.is_empty() {
        return Err(CoreError::validation("face: embedding must not be empty"));
    }

    let dist = embeddings.min_distance(&reference);

    if dist < 0.0 {
        return Ok(false);
    }

    let mut radius = (dist - 0.01).max(COLLISION_RADIUS_FLOOR);

    // Radius only ever shrinks.
    if f.collision_radius > 0.0 && f.collision_radius < radius {
        radius = f.collision_radius;
    }

    face::Entity::update_many()
        .col_expr(
            face::Column::Collisions,
            Expr::col(face::Column::Collisions).add(1),
        )
        .col_expr(face::Column::CollisionRadius, Expr::value(radius))
        .col_expr(
            face::Column::MatchedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(face::Column::Id.eq(f.id.clone()))
        .exec(db)
        .await?;

    f.collisions += 1;
    f.collision_radius = radius;
    f.matched_at = None;

    Ok(true)
}

/// Matches all valid faceless markers against this cluster and links those
/// within matching distance of the reference embedding. Returns the number
/// of markers linked.
///
/// Boxed because linking a marker can cascade back into matching.
pub fn match_markers<'a>(
    db: &'a DatabaseConnection,
    cfg: &'a FaceConfig,
    f: &'a face::Model,
) -> BoxFuture<'a, Result<usize>> {
    async move {
        let reference = embedding(f)?;

        if reference.is_empty() {
            return Ok(0);
        }

        let rows = marker::Entity::find()
            .filter(marker::Column::MarkerType.eq(MarkerKind::Face.to_string()))
            .filter(marker::Column::MarkerInvalid.eq(false))
            .filter(marker::Column::FaceId.eq(""))
            .filter(marker::Column::EmbeddingsJson.ne(""))
            .all(db)
            .await?;

        let mut matched = 0usize;

        for row in rows {
            let mut m = Marker::from_model(row);

            let dist = m.embeddings().min_distance(&reference);

            if dist < 0.0 || dist > f.sample_radius + cfg.match_dist {
                continue;
            }

            if m.set_face(db, cfg, Some(f), dist).await? {
                matched += 1;
            }
        }

        if matched > 0 {
            debug!(face = %f.id, matched, "faces: linked markers");
        }

        Ok(matched)
    }
    .boxed()
}

/// Flags every photo containing a marker linked to this face for metadata
/// maintenance.
pub async fn refresh_photos(db: &DatabaseConnection, face_id: &str) -> Result<()> {
    if face_id.is_empty() {
        return Err(CoreError::validation("face: id must not be empty"));
    }

    let file_uids = Query::select()
        .column(marker::Column::FileUid)
        .from(marker::Entity)
        .and_where(Expr::col(marker::Column::FaceId).eq(face_id))
        .to_owned();

    let photo_uids = Query::select()
        .column(file::Column::PhotoUid)
        .from(file::Entity)
        .and_where(Expr::col(file::Column::Id).in_subquery(file_uids))
        .to_owned();

    photo::Entity::update_many()
        .col_expr(
            photo::Column::CheckedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(photo::Column::Id.in_subquery(photo_uids))
        .exec(db)
        .await?;

    Ok(())
}
