//! Marker operations: detected face regions and their links.
//!
//! A marker is one detected region within one file. Face markers carry
//! embedding vectors and may be linked to a face cluster and a subject.
//! The functions here keep those links consistent: linking respects manual
//! provenance, conflicting names become recorded collisions instead of
//! silent overwrites, and every link change flags the affected photos for
//! metadata maintenance.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use tracing::{debug, info, warn};

use crate::config::FaceConfig;
use crate::domain::crop::Area;
use crate::domain::detection::FaceDetection;
use crate::domain::embedding::{Embeddings, DIST_UNKNOWN};
use crate::domain::provenance::{MarkerKind, Src, SubjectKind};
use crate::infrastructure::database::entities::{face, file, marker, photo, subject};
use crate::operations::{faces, subjects};
use crate::shared::errors::{CoreError, Result};
use crate::shared::text::{clip, title_case, CLIP_DEFAULT};
use crate::shared::uid;

/// Markers closer than this on both axes are considered re-detections of
/// the same region.
pub const PROXIMITY_TOLERANCE: f32 = 0.07;

/// Detections scoring below this are flagged for review.
const REVIEW_SCORE: i32 = 30;

/// User-submitted changes to a single marker.
#[derive(Debug, Clone, Default)]
pub struct MarkerForm {
    pub subj_src: Src,
    pub marker_name: String,
    pub marker_invalid: bool,
    pub marker_review: bool,
}

/// A marker row together with its lazily loaded face, subject and parsed
/// embeddings. The caches are validated by id equality, so stale entries
/// are transparently re-fetched after a link changes.
#[derive(Debug, Clone)]
pub struct Marker {
    pub model: marker::Model,
    face: Option<face::Model>,
    subject: Option<subject::Model>,
    embeddings: Option<Embeddings>,
}

impl Marker {
    pub fn from_model(model: marker::Model) -> Self {
        Self {
            model,
            face: None,
            subject: None,
            embeddings: None,
        }
    }

    /// Builds a new marker for a region of a file. No identifier is
    /// assigned yet; `create` and `save` generate one on first persist.
    pub fn new(file: &file::Model, area: Area, subj_uid: &str, src: Src, kind: MarkerKind) -> Self {
        let now = Utc::now();

        Self::from_model(marker::Model {
            id: String::new(),
            file_uid: file.id.clone(),
            file_hash: file.file_hash.clone(),
            crop_area: area.encode(),
            marker_type: kind.to_string(),
            marker_src: src.to_string(),
            marker_name: String::new(),
            marker_invalid: false,
            marker_review: false,
            subj_uid: subj_uid.to_string(),
            subj_src: String::new(),
            face_id: String::new(),
            face_dist: DIST_UNKNOWN,
            embeddings_json: String::new(),
            landmarks_json: String::new(),
            x: area.x,
            y: area.y,
            w: area.w,
            h: area.h,
            q: 0,
            size: -1,
            score: 0,
            matched_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Builds a face marker from a detection result.
    pub fn new_face(detection: &FaceDetection, file: &file::Model, subj_uid: &str) -> Self {
        let mut m = Self::new(file, detection.area, subj_uid, Src::Image, MarkerKind::Face);

        m.model.size = detection.size;
        m.model.q = ((detection.score as f64).ln() as f32 * m.model.size as f32 * m.model.w) as i32;
        m.model.score = detection.score;
        m.model.marker_review = detection.score < REVIEW_SCORE;
        m.model.face_dist = DIST_UNKNOWN;
        m.model.embeddings_json = detection.embeddings.to_json();
        m.model.landmarks_json = detection.landmarks_json.clone();

        m
    }

    pub fn uid(&self) -> &str {
        &self.model.id
    }

    /// Parsed marker embeddings; parsed once and cached. A malformed
    /// column is logged and treated as empty.
    pub fn embeddings(&mut self) -> &Embeddings {
        if self.embeddings.is_none() {
            let parsed = match Embeddings::from_json(&self.model.embeddings_json) {
                Ok(e) => e,
                Err(err) => {
                    warn!(marker = %self.model.id, "marker: failed parsing embeddings: {err}");
                    Embeddings::default()
                }
            };

            self.embeddings = Some(parsed);
        }

        self.embeddings.get_or_insert_with(Embeddings::default)
    }

    fn validate_position(&self) -> Result<()> {
        let (x, y) = (self.model.x, self.model.y);

        if x == 0.0 || y == 0.0 || !(-1.0..=1.0).contains(&x) || !(-1.0..=1.0).contains(&y) {
            return Err(CoreError::validation("marker: invalid position"));
        }

        Ok(())
    }

    fn ensure_uid(&mut self) {
        if !uid::is_uid(&self.model.id, 'm') {
            self.model.id = uid::new_uid('m');
        }
    }

    /// Inserts a new row. Fails before any write when the position is
    /// degenerate or out of bounds.
    pub async fn create(&mut self, db: &DatabaseConnection) -> Result<()> {
        self.validate_position()?;
        self.ensure_uid();

        marker::Entity::insert(self.model.clone().into_active_model().reset_all())
            .exec_without_returning(db)
            .await?;

        Ok(())
    }

    /// Updates the existing row or inserts a new one.
    pub async fn save(&mut self, db: &DatabaseConnection) -> Result<()> {
        self.validate_position()?;
        self.ensure_uid();
        self.model.updated_at = Utc::now();

        let exists = marker::Entity::find_by_id(self.model.id.clone())
            .one(db)
            .await?
            .is_some();

        if exists {
            marker::Entity::update(self.model.clone().into_active_model().reset_all())
                .exec(db)
                .await?;
        } else {
            marker::Entity::insert(self.model.clone().into_active_model().reset_all())
                .exec_without_returning(db)
                .await?;
        }

        Ok(())
    }

    /// Applies user-submitted form data and persists any change. A manual
    /// rename also renames or merges the subject and cascades to related
    /// automatic markers.
    pub async fn save_form(
        &mut self,
        db: &DatabaseConnection,
        cfg: &FaceConfig,
        form: &MarkerForm,
    ) -> Result<bool> {
        let mut changed = false;

        if self.model.marker_invalid != form.marker_invalid {
            self.model.marker_invalid = form.marker_invalid;
            changed = true;
        }

        if self.model.marker_review != form.marker_review {
            self.model.marker_review = form.marker_review;
            changed = true;
        }

        if form.subj_src == Src::Manual
            && !form.marker_name.trim().is_empty()
            && form.marker_name != self.model.marker_name
        {
            self.model.subj_src = Src::Manual.to_string();
            self.model.marker_name = title_case(&clip(&form.marker_name, CLIP_DEFAULT));

            self.sync_subject(db, cfg, true).await?;

            changed = true;
        }

        if changed {
            self.save(db).await?;
        }

        Ok(changed)
    }

    /// Tests if the marker already has the best matching face.
    pub fn has_face(&self, f: Option<&face::Model>, dist: f64) -> bool {
        if self.model.face_id.is_empty() {
            false
        } else if f.is_none() {
            true
        } else if f.map(|f| f.id.as_str()) == Some(self.model.face_id.as_str()) {
            true
        } else if self.model.face_dist < 0.0 {
            false
        } else if dist < 0.0 {
            true
        } else {
            self.model.face_dist <= dist
        }
    }

    /// Links the marker to a face at the given embedding distance and
    /// reconciles the subject on both sides. A negative distance is
    /// recomputed from the embeddings.
    ///
    /// Two named subjects claiming the same face is a collision: it is
    /// recorded against the face and the marker keeps its manual subject.
    /// Reports whether the stored links actually changed.
    pub async fn set_face(
        &mut self,
        db: &DatabaseConnection,
        cfg: &FaceConfig,
        f: Option<&face::Model>,
        dist: f64,
    ) -> Result<bool> {
        let f = f.ok_or_else(|| CoreError::validation("marker: face is required"))?;

        if MarkerKind::from_db(&self.model.marker_type) != MarkerKind::Face {
            return Err(CoreError::validation("marker: not a face marker"));
        }

        let subj_src = Src::from_db(&self.model.subj_src);

        // Any reason not to set the new face?
        if subj_src.is_automatic()
            || f.subj_uid.is_empty()
            || self.model.subj_uid.is_empty()
            || f.subj_uid == self.model.subj_uid
        {
            // Subject wasn't set manually, or the subjects match.
        } else {
            let mut conflicting = f.clone();
            let embeddings = self.embeddings().clone();

            if faces::resolve_collision(db, &mut conflicting, &embeddings).await? {
                info!(
                    marker = %self.model.id, marker_subj = %self.model.subj_uid,
                    face = %f.id, face_subj = %f.subj_uid, src = %self.model.subj_src,
                    "faces: collision"
                );
            }

            return Ok(false);
        }

        let mut f = f.clone();

        // Push the marker's known subject onto a subjectless face.
        if subj_src.is_automatic() || self.model.subj_uid.is_empty() || !f.subj_uid.is_empty() {
            // Face already has a subject, or the marker subject is unknown.
        } else {
            let subj_uid = self.model.subj_uid.clone();
            faces::set_subject_uid(db, &mut f, &subj_uid).await?;
        }

        self.face = Some(f.clone());

        // Skip the update if the same face is already set.
        if self.model.subj_uid == f.subj_uid && self.model.face_id == f.id {
            self.matched(db).await?;
            return Ok(false);
        }

        let prev_face_id = self.model.face_id.clone();
        let prev_subj_uid = self.model.subj_uid.clone();
        let prev_subj_src = self.model.subj_src.clone();

        self.model.face_id = f.id.clone();
        self.model.face_dist = dist;

        if self.model.face_dist < 0.0 {
            let reference = faces::embedding(&f)?;
            self.model.face_dist = self.embeddings().min_distance(&reference);
        }

        if !f.subj_uid.is_empty() {
            self.model.subj_uid = f.subj_uid.clone();
        }

        self.sync_subject(db, cfg, false).await?;

        // Adopt a subject the sync may have established on the marker.
        let subj_src = Src::from_db(&self.model.subj_src);

        if subj_src.is_automatic() || self.model.subj_uid.is_empty() || f.subj_uid == self.model.subj_uid
        {
            // Not needed.
        } else {
            let subj_uid = self.model.subj_uid.clone();
            faces::set_subject_uid(db, &mut f, &subj_uid).await?;
            self.face = Some(f.clone());
        }

        let updated = self.model.face_id != prev_face_id
            || self.model.subj_uid != prev_subj_uid
            || self.model.subj_src != prev_subj_src;

        self.model.marker_review = false;
        self.model.matched_at = Some(Utc::now());

        marker::Entity::update_many()
            .col_expr(marker::Column::FaceId, Expr::value(self.model.face_id.clone()))
            .col_expr(marker::Column::FaceDist, Expr::value(self.model.face_dist))
            .col_expr(marker::Column::SubjUid, Expr::value(self.model.subj_uid.clone()))
            .col_expr(marker::Column::SubjSrc, Expr::value(self.model.subj_src.clone()))
            .col_expr(marker::Column::MarkerReview, Expr::value(false))
            .col_expr(marker::Column::MatchedAt, Expr::value(self.model.matched_at))
            .filter(marker::Column::Id.eq(self.model.id.clone()))
            .exec(db)
            .await?;

        if !updated {
            return Ok(false);
        }

        self.refresh_photos(db).await?;

        Ok(true)
    }

    /// Maintains the marker's subject relationship: renames or merges the
    /// subject after a manual name change, back-fills the face link,
    /// claims the face for the subject and, when `update_related` is set,
    /// cascades the subject to sibling markers of the same face whose
    /// subject was set automatically.
    pub async fn sync_subject(
        &mut self,
        db: &DatabaseConnection,
        cfg: &FaceConfig,
        update_related: bool,
    ) -> Result<()> {
        if MarkerKind::from_db(&self.model.marker_type) != MarkerKind::Face {
            return Ok(());
        }

        let Some(mut subj) = self.subject(db).await? else {
            return Ok(());
        };

        if Src::from_db(&self.model.subj_src).is_automatic() {
            return Ok(());
        }

        // Rename the subject after a manual name change?
        if self.model.marker_name.is_empty() || subj.subj_name == self.model.marker_name {
            // Nothing to rename.
        } else {
            let name = self.model.marker_name.clone();
            subj = subjects::update_name(db, subj, &name).await?;

            // The subject may have been merged into another one.
            self.model.subj_uid = subj.id.clone();
            self.model.marker_name = subj.subj_name.clone();
            self.subject = Some(subj.clone());
        }

        // Create a known face for the subject?
        if self.model.face_id.is_empty() {
            if let Some(f) = self.face(db, cfg).await? {
                self.model.face_id = f.id.clone();
            }
        }

        if self.model.face_id.is_empty() || self.model.subj_uid.is_empty() {
            return Ok(());
        }

        let claimed = faces::claim_subject(db, &self.model.face_id, &self.model.subj_uid).await?;

        if update_related {
            marker::Entity::update_many()
                .col_expr(marker::Column::SubjUid, Expr::value(self.model.subj_uid.clone()))
                .col_expr(marker::Column::SubjSrc, Expr::value(Src::Auto.to_string()))
                .col_expr(marker::Column::MarkerReview, Expr::value(false))
                .filter(marker::Column::Id.ne(self.model.id.clone()))
                .filter(marker::Column::FaceId.eq(self.model.face_id.clone()))
                .filter(marker::Column::SubjSrc.is_in(["", "auto"]))
                .filter(marker::Column::SubjUid.ne(self.model.subj_uid.clone()))
                .exec(db)
                .await?;
        }

        if claimed {
            debug!(subject = %subj.subj_name, face = %self.model.face_id, "marker: matched subject with face");
            faces::refresh_photos(db, &self.model.face_id).await?;
        }

        Ok(())
    }

    /// Returns the matching subject, creating one when the marker carries
    /// a manually assigned name without a subject link yet.
    pub async fn subject(&mut self, db: &DatabaseConnection) -> Result<Option<subject::Model>> {
        if let Some(s) = &self.subject {
            if s.id == self.model.subj_uid {
                return Ok(Some(s.clone()));
            }
        }

        let subj_src = Src::from_db(&self.model.subj_src);

        if !subj_src.is_automatic()
            && !self.model.marker_name.is_empty()
            && self.model.subj_uid.is_empty()
        {
            let Some(subj) =
                subjects::new_subject(&self.model.marker_name, SubjectKind::Person, subj_src)
            else {
                debug!(marker = %self.model.id, name = %self.model.marker_name, "marker: invalid subject name");
                return Ok(None);
            };

            let subj = subjects::first_or_create(db, subj).await?;

            self.model.subj_uid = subj.id.clone();
            self.subject = Some(subj.clone());

            return Ok(Some(subj));
        }

        self.subject = subjects::find_subject(db, &self.model.subj_uid).await?;

        Ok(self.subject.clone())
    }

    /// Returns the matching face, creating a cluster from the marker's own
    /// embeddings when the subject was assigned manually and the detection
    /// is large and confident enough to seed one.
    pub async fn face(
        &mut self,
        db: &DatabaseConnection,
        cfg: &FaceConfig,
    ) -> Result<Option<face::Model>> {
        if let Some(f) = &self.face {
            if f.id == self.model.face_id {
                return Ok(Some(f.clone()));
            }
        }

        let subj_src = Src::from_db(&self.model.subj_src);

        if !subj_src.is_automatic() && self.model.face_id.is_empty() {
            if self.model.size < cfg.cluster_min_size || self.model.score < cfg.cluster_min_score {
                debug!(
                    marker = %self.model.id, size = self.model.size, score = self.model.score,
                    "faces: skipped adding face for low-quality marker"
                );
                return Ok(None);
            }

            let embeddings = self.embeddings().clone();

            if embeddings.is_empty() {
                warn!(marker = %self.model.id, "marker: no embeddings");
                return Ok(None);
            }

            let Some(f) = faces::new_face(&self.model.subj_uid, subj_src, &embeddings) else {
                warn!(marker = %self.model.id, "marker: failed adding face");
                return Ok(None);
            };

            let f = faces::first_or_create(db, f).await?;

            if let Err(err) = faces::match_markers(db, cfg, &f).await {
                warn!("faces: {err} (match markers)");
            }

            self.model.face_id = f.id.clone();
            self.model.face_dist = 0.0;
            self.face = Some(f.clone());

            Ok(Some(f))
        } else {
            self.face = faces::find_face(db, &self.model.face_id).await?;

            Ok(self.face.clone())
        }
    }

    /// Removes an existing face association. The subject link is removed
    /// too when it was set automatically.
    pub async fn clear_face(&mut self, db: &DatabaseConnection) -> Result<bool> {
        if self.model.face_id.is_empty() {
            self.matched(db).await?;
            return Ok(false);
        }

        self.face = None;
        self.model.face_id = String::new();
        self.model.face_dist = DIST_UNKNOWN;
        self.model.matched_at = Some(Utc::now());

        let mut update = marker::Entity::update_many()
            .col_expr(marker::Column::FaceId, Expr::value(""))
            .col_expr(marker::Column::FaceDist, Expr::value(DIST_UNKNOWN))
            .col_expr(marker::Column::MatchedAt, Expr::value(self.model.matched_at));

        if Src::from_db(&self.model.subj_src).is_automatic() {
            self.model.subj_uid = String::new();
            update = update.col_expr(marker::Column::SubjUid, Expr::value(""));
        }

        update
            .filter(marker::Column::Id.eq(self.model.id.clone()))
            .exec(db)
            .await?;

        self.refresh_photos(db).await?;

        Ok(true)
    }

    /// Removes an existing subject association in one atomic write and
    /// records the collision against the previously linked face.
    pub async fn clear_subject(&mut self, db: &DatabaseConnection, src: Src) -> Result<()> {
        // The face must be resolved before its link is cleared.
        if self.face.is_none() {
            self.face = faces::find_face(db, &self.model.face_id).await?;
        }

        self.model.marker_name = String::new();
        self.model.face_id = String::new();
        self.model.face_dist = DIST_UNKNOWN;
        self.model.subj_uid = String::new();
        self.model.subj_src = src.to_string();

        marker::Entity::update_many()
            .col_expr(marker::Column::MarkerName, Expr::value(""))
            .col_expr(marker::Column::FaceId, Expr::value(""))
            .col_expr(marker::Column::FaceDist, Expr::value(DIST_UNKNOWN))
            .col_expr(marker::Column::SubjUid, Expr::value(""))
            .col_expr(marker::Column::SubjSrc, Expr::value(src.to_string()))
            .filter(marker::Column::Id.eq(self.model.id.clone()))
            .exec(db)
            .await?;

        let Some(mut f) = self.face.take() else {
            self.subject = None;
            return Ok(());
        };

        let embeddings = self.embeddings().clone();

        if faces::resolve_collision(db, &mut f, &embeddings).await? {
            debug!(face = %f.id, "faces: resolved collision");
        }

        self.subject = None;

        Ok(())
    }

    /// The marker's display name, falling back to the subject's name.
    pub async fn subject_name(&mut self, db: &DatabaseConnection) -> Result<String> {
        if !self.model.marker_name.is_empty() {
            return Ok(self.model.marker_name.clone());
        }

        Ok(self
            .subject(db)
            .await?
            .map(|s| s.subj_name)
            .unwrap_or_default())
    }

    /// Updates the match timestamp.
    pub async fn matched(&mut self, db: &DatabaseConnection) -> Result<()> {
        self.model.matched_at = Some(Utc::now());

        marker::Entity::update_many()
            .col_expr(marker::Column::MatchedAt, Expr::value(self.model.matched_at))
            .filter(marker::Column::Id.eq(self.model.id.clone()))
            .exec(db)
            .await?;

        Ok(())
    }

    /// Flags the photos containing this marker for metadata maintenance.
    pub async fn refresh_photos(&self, db: &DatabaseConnection) -> Result<()> {
        if self.model.id.is_empty() {
            return Err(CoreError::validation("marker: empty uid"));
        }

        let file_uids = Query::select()
            .column(marker::Column::FileUid)
            .from(marker::Entity)
            .and_where(Expr::col(marker::Column::Id).eq(self.model.id.clone()))
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
}

pub async fn find_marker(db: &DatabaseConnection, uid: &str) -> Result<Option<Marker>> {
    if uid.is_empty() {
        return Ok(None);
    }

    Ok(marker::Entity::find_by_id(uid)
        .one(db)
        .await?
        .map(Marker::from_model))
}

/// Persists a marker, merging it with an existing one covering roughly the
/// same region of the same file. On a merge, the incoming detection only
/// overwrites the stored detection fields when its provenance priority is
/// at least as high; links and review state are never touched.
pub async fn update_or_create(db: &DatabaseConnection, mut m: Marker) -> Result<Marker> {
    if !m.model.id.is_empty() {
        m.save(db).await?;
        debug!(marker = %m.model.id, file = %m.model.file_uid, "faces: saved marker");
        return Ok(m);
    }

    let d = PROXIMITY_TOLERANCE;

    let existing = marker::Entity::find()
        .filter(marker::Column::FileUid.eq(m.model.file_uid.clone()))
        .filter(marker::Column::X.gt(m.model.x - d))
        .filter(marker::Column::X.lt(m.model.x + d))
        .filter(marker::Column::Y.gt(m.model.y - d))
        .filter(marker::Column::Y.lt(m.model.y + d))
        .one(db)
        .await?;

    if let Some(mut existing) = existing {
        if Src::from_db(&m.model.marker_src).priority()
            < Src::from_db(&existing.marker_src).priority()
        {
            return Ok(Marker::from_model(existing));
        }

        marker::Entity::update_many()
            .col_expr(marker::Column::MarkerType, Expr::value(m.model.marker_type.clone()))
            .col_expr(marker::Column::MarkerSrc, Expr::value(m.model.marker_src.clone()))
            .col_expr(marker::Column::CropArea, Expr::value(m.model.crop_area.clone()))
            .col_expr(marker::Column::X, Expr::value(m.model.x))
            .col_expr(marker::Column::Y, Expr::value(m.model.y))
            .col_expr(marker::Column::W, Expr::value(m.model.w))
            .col_expr(marker::Column::H, Expr::value(m.model.h))
            .col_expr(marker::Column::Q, Expr::value(m.model.q))
            .col_expr(marker::Column::Size, Expr::value(m.model.size))
            .col_expr(marker::Column::Score, Expr::value(m.model.score))
            .col_expr(marker::Column::LandmarksJson, Expr::value(m.model.landmarks_json.clone()))
            .col_expr(marker::Column::EmbeddingsJson, Expr::value(m.model.embeddings_json.clone()))
            .filter(marker::Column::Id.eq(existing.id.clone()))
            .exec(db)
            .await?;

        debug!(marker = %existing.id, file = %existing.file_uid, "faces: updated existing marker");

        existing.marker_type = m.model.marker_type;
        existing.marker_src = m.model.marker_src;
        existing.crop_area = m.model.crop_area;
        existing.x = m.model.x;
        existing.y = m.model.y;
        existing.w = m.model.w;
        existing.h = m.model.h;
        existing.q = m.model.q;
        existing.size = m.model.size;
        existing.score = m.model.score;
        existing.landmarks_json = m.model.landmarks_json;
        existing.embeddings_json = m.model.embeddings_json;

        return Ok(Marker::from_model(existing));
    }

    m.create(db).await?;

    debug!(marker = %m.model.id, file = %m.model.file_uid, "faces: added marker");

    Ok(m)
}
