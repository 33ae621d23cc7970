//! Subject operations: named people and pets.
//!
//! Subjects are keyed by a normalized slug so that equivalent spellings of
//! the same name always resolve to one row. Renaming a subject onto an
//! existing slug merges the two, repointing every marker and face link in
//! bulk before the stale row is removed.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use tracing::{debug, info};

use crate::domain::provenance::{Src, SubjectKind};
use crate::infrastructure::database::entities::{face, marker, subject};
use crate::shared::errors::{CoreError, Result};
use crate::shared::text::{clip, slug, title_case, CLIP_DEFAULT};
use crate::shared::uid;

/// Builds a new subject from a display name. Returns `None` when the name
/// normalizes to nothing, e.g. punctuation only.
pub fn new_subject(name: &str, kind: SubjectKind, src: Src) -> Option<subject::Model> {
    let subj_name = title_case(&clip(name, CLIP_DEFAULT));
    let subj_slug = slug(&subj_name);

    if subj_slug.is_empty() {
        return None;
    }

    let now = Utc::now();

    Some(subject::Model {
        id: uid::new_uid('j'),
        subj_type: kind.to_string(),
        subj_src: src.to_string(),
        subj_slug,
        subj_name,
        subj_favorite: false,
        created_at: now,
        updated_at: now,
    })
}

/// Inserts the subject unless one with the same slug already exists, then
/// returns the stored row either way.
pub async fn first_or_create(
    db: &DatabaseConnection,
    subject: subject::Model,
) -> Result<subject::Model> {
    let subj_slug = subject.subj_slug.clone();

    subject::Entity::insert(subject.into_active_model().reset_all())
        .on_conflict(
            OnConflict::column(subject::Column::SubjSlug)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    subject::Entity::find()
        .filter(subject::Column::SubjSlug.eq(subj_slug.clone()))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::validation(format!("subject {subj_slug} not found after insert")))
}

pub async fn find_subject(db: &DatabaseConnection, uid: &str) -> Result<Option<subject::Model>> {
    if uid.is_empty() {
        return Ok(None);
    }

    Ok(subject::Entity::find_by_id(uid).one(db).await?)
}

pub async fn find_by_slug(db: &DatabaseConnection, s: &str) -> Result<Option<subject::Model>> {
    if s.is_empty() {
        return Ok(None);
    }

    Ok(subject::Entity::find()
        .filter(subject::Column::SubjSlug.eq(s))
        .one(db)
        .await?)
}

/// Renames a subject. When the new name's slug already belongs to another
/// subject, the two are merged: all markers and faces linked to this
/// subject are repointed to the existing one and this row is deleted. The
/// surviving subject is returned in both cases.
pub async fn update_name(
    db: &DatabaseConnection,
    subject: subject::Model,
    new_name: &str,
) -> Result<subject::Model> {
    let subj_name = title_case(&clip(new_name, CLIP_DEFAULT));

    if subj_name.is_empty() {
        return Err(CoreError::validation("subject: name must not be empty"));
    }

    if subj_name == subject.subj_name {
        return Ok(subject);
    }

    let subj_slug = slug(&subj_name);

    if subj_slug.is_empty() {
        return Err(CoreError::validation("subject: invalid name"));
    }

    if let Some(existing) = find_by_slug(db, &subj_slug).await? {
        if existing.id != subject.id {
            return merge(db, subject, existing).await;
        }
    }

    debug!(uid = %subject.id, name = %subj_name, "subjects: renamed");

    let mut updated = subject;
    updated.subj_name = subj_name;
    updated.subj_slug = subj_slug;
    updated.updated_at = Utc::now();

    subject::Entity::update(updated.clone().into_active_model().reset_all())
        .exec(db)
        .await?;

    Ok(updated)
}

/// Repoints every marker and face from `source` to `target`, then removes
/// the source row.
async fn merge(
    db: &DatabaseConnection,
    source: subject::Model,
    target: subject::Model,
) -> Result<subject::Model> {
    info!(from = %source.id, to = %target.id, slug = %target.subj_slug, "subjects: merging");

    marker::Entity::update_many()
        .col_expr(marker::Column::SubjUid, Expr::value(target.id.clone()))
        .filter(marker::Column::SubjUid.eq(source.id.clone()))
        .exec(db)
        .await?;

    face::Entity::update_many()
        .col_expr(face::Column::SubjUid, Expr::value(target.id.clone()))
        .filter(face::Column::SubjUid.eq(source.id.clone()))
        .exec(db)
        .await?;

    subject::Entity::delete_by_id(source.id).exec(db).await?;

    Ok(target)
}
