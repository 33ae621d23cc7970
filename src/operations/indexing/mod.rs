//! Library indexing orchestrator.
//!
//! Indexes a group of related files (one main media file plus sidecars and
//! alternative renditions) into the photo, file and marker tables. Media
//! conversion, thumbnailing and face detection are injected collaborators;
//! the orchestrator only decides what runs, in which order, and which
//! failures abort the group.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use std::collections::HashSet;
use strum::Display;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::domain::detection::FaceDetection;
use crate::infrastructure::database::entities::{file, photo};
use crate::operations::markers::{self, Marker};
use crate::shared::errors::Result;
use crate::shared::uid;

/// Coarse media classification used to pick the processing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    Jpeg,
    Raw,
    Video,
    Sidecar,
    Other,
}

/// One file on disk as seen by the indexer.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub media_type: MediaType,
    /// Whether a JPEG rendition of this file already exists.
    pub has_jpeg: bool,
    /// Whether a metadata sidecar still needs to be extracted.
    pub needs_metadata_json: bool,
}

impl MediaFile {
    pub fn is_media(&self) -> bool {
        matches!(self.media_type, MediaType::Jpeg | MediaType::Raw | MediaType::Video)
    }

    pub fn is_jpeg(&self) -> bool {
        self.media_type == MediaType::Jpeg
    }
}

/// A main media file together with its sidecars and other renditions.
#[derive(Debug, Clone, Default)]
pub struct RelatedFiles {
    pub main: Option<MediaFile>,
    pub files: Vec<MediaFile>,
}

/// Converts media files into formats the rest of the pipeline understands.
pub trait MediaConvert {
    /// Extracts a metadata sidecar and returns its path.
    fn to_json(&self, f: &MediaFile) -> Result<String>;

    /// Produces a JPEG rendition of a non-JPEG media file.
    fn to_jpeg(&self, f: &MediaFile) -> Result<MediaFile>;
}

/// Produces the default thumbnail set for a JPEG.
pub trait Thumbnailer {
    fn resample_default(&self, f: &MediaFile, thumb_path: &std::path::Path) -> Result<()>;
}

/// Finds faces in a JPEG. The detection model itself is a black box.
pub trait FaceDetector {
    fn detect(&self, f: &MediaFile) -> Result<Vec<FaceDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IndexStatus {
    Added,
    Updated,
    Skipped,
    Failed,
}

/// Outcome of indexing one file or one group. A failed group is a normal
/// result, not an error; errors are reserved for storage failures.
#[derive(Debug, Clone)]
pub struct IndexResult {
    pub status: IndexStatus,
    pub file_uid: String,
    pub marker_uids: Vec<String>,
    pub err: Option<String>,
}

impl IndexResult {
    fn failed(msg: impl Into<String>) -> Self {
        Self {
            status: IndexStatus::Failed,
            file_uid: String::new(),
            marker_uids: Vec::new(),
            err: Some(msg.into()),
        }
    }

    pub fn indexed(&self) -> bool {
        matches!(self.status, IndexStatus::Added | IndexStatus::Updated)
    }

    pub fn failed_status(&self) -> bool {
        self.status == IndexStatus::Failed
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub convert: bool,
}

/// The indexing orchestrator. Holds the database connection, configuration
/// and the injected media collaborators for the duration of one run.
pub struct Indexer<'a> {
    db: &'a DatabaseConnection,
    index_cfg: &'a IndexConfig,
    convert: &'a dyn MediaConvert,
    thumbs: &'a dyn Thumbnailer,
    detector: &'a dyn FaceDetector,
}

impl<'a> Indexer<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        index_cfg: &'a IndexConfig,
        convert: &'a dyn MediaConvert,
        thumbs: &'a dyn Thumbnailer,
        detector: &'a dyn FaceDetector,
    ) -> Self {
        Self {
            db,
            index_cfg,
            convert,
            thumbs,
            detector,
        }
    }

    /// Indexes the main file of a group. Returns a failed result when the
    /// group has no main file, the main file exceeds the size limit, or a
    /// required conversion step fails.
    pub async fn index_main(
        &self,
        related: &mut RelatedFiles,
        opt: &IndexOptions,
    ) -> Result<IndexResult> {
        let Some(f) = related.main.clone() else {
            return Ok(IndexResult::failed("index: no main file found"));
        };

        let size_limit = self.index_cfg.originals_limit;

        if size_limit > 0 && f.file_size > size_limit {
            return Ok(IndexResult::failed(format!(
                "index: {} exceeds file size limit ({} / {} MB)",
                f.file_name,
                f.file_size / (1024 * 1024),
                size_limit / (1024 * 1024)
            )));
        }

        if f.needs_metadata_json {
            match self.convert.to_json(&f) {
                Ok(json_name) => debug!("index: {json_name} created"),
                Err(err) => debug!("index: {err} in {} (extract metadata)", f.file_name),
            }
        }

        if opt.convert && f.is_media() && !f.has_jpeg {
            match self.convert.to_jpeg(&f) {
                Ok(jpeg) => {
                    debug!("index: {} created", jpeg.file_name);

                    if let Err(err) = self.thumbs.resample_default(&jpeg, &self.index_cfg.thumb_path) {
                        return Ok(IndexResult::failed(format!(
                            "index: failed creating thumbs for {} ({err})",
                            f.file_name
                        )));
                    }

                    related.files.push(jpeg);
                }
                Err(err) => {
                    return Ok(IndexResult::failed(format!(
                        "index: failed converting {} to jpeg ({err})",
                        f.file_name
                    )));
                }
            }
        }

        let result = self.index_file(&f).await?;

        if result.indexed() && f.is_jpeg() {
            if let Err(err) = self.thumbs.resample_default(&f, &self.index_cfg.thumb_path) {
                warn!("index: failed creating thumbs for {} ({err})", f.file_name);
            }
        }

        info!(
            "index: {} main {} file {}",
            result.status, f.media_type, f.file_name
        );

        Ok(result)
    }

    /// Indexes a group of related files. Files are deduplicated by name
    /// within the group; oversized related files are skipped with a
    /// warning, while a failed conversion aborts the whole group.
    pub async fn index_related(
        &self,
        mut related: RelatedFiles,
        opt: &IndexOptions,
    ) -> Result<IndexResult> {
        let mut done: HashSet<String> = HashSet::new();
        let size_limit = self.index_cfg.originals_limit;

        let result = self.index_main(&mut related, opt).await?;

        if result.failed_status() {
            warn!("{}", result.err.as_deref().unwrap_or("index: failed"));
            return Ok(result);
        } else if !result.indexed() {
            // Skip related files if the main file was not fully indexed.
            return Ok(result);
        }

        if let Some(main) = &related.main {
            done.insert(main.file_name.clone());
        }

        let mut i = 0;

        // Conversions may append renditions while iterating.
        while i < related.files.len() {
            let f = related.files[i].clone();
            i += 1;

            if !done.insert(f.file_name.clone()) {
                continue;
            }

            if size_limit > 0 && f.file_size > size_limit {
                warn!(
                    "index: {} exceeds file size limit ({} / {} MB)",
                    f.file_name,
                    f.file_size / (1024 * 1024),
                    size_limit / (1024 * 1024)
                );
                continue;
            }

            if f.needs_metadata_json {
                match self.convert.to_json(&f) {
                    Ok(json_name) => debug!("index: {json_name} created"),
                    Err(err) => debug!("index: {err} in {} (extract metadata)", f.file_name),
                }
            }

            if opt.convert && f.is_media() && !f.has_jpeg {
                match self.convert.to_jpeg(&f) {
                    Ok(jpeg) => {
                        debug!("index: {} created", jpeg.file_name);

                        if let Err(err) = self.thumbs.resample_default(&jpeg, &self.index_cfg.thumb_path) {
                            return Ok(IndexResult::failed(format!(
                                "index: failed creating thumbs for {} ({err})",
                                f.file_name
                            )));
                        }

                        related.files.push(jpeg);
                    }
                    Err(err) => {
                        return Ok(IndexResult::failed(format!(
                            "index: failed converting {} to jpeg ({err})",
                            f.file_name
                        )));
                    }
                }
            }

            let res = self.index_file(&f).await?;

            if res.indexed() && f.is_jpeg() {
                if let Err(err) = self.thumbs.resample_default(&f, &self.index_cfg.thumb_path) {
                    warn!("index: failed creating thumbs for {} ({err})", f.file_name);
                }
            }

            info!(
                "index: {} related {} file {}",
                res.status, f.media_type, f.file_name
            );
        }

        Ok(result)
    }

    /// Indexes a single file: upserts its row (and a photo row for new
    /// files), then runs face detection on JPEGs and reconciles the
    /// resulting markers.
    async fn index_file(&self, f: &MediaFile) -> Result<IndexResult> {
        let now = Utc::now();

        let existing = file::Entity::find()
            .filter(file::Column::FileName.eq(f.file_name.clone()))
            .one(self.db)
            .await?;

        let (model, status) = match existing {
            Some(mut model) => {
                model.file_hash = f.file_hash.clone();
                model.file_size = f.file_size;
                model.updated_at = now;

                file::Entity::update(model.clone().into_active_model().reset_all())
                    .exec(self.db)
                    .await?;

                (model, IndexStatus::Updated)
            }
            None => {
                let photo_row = photo::Model {
                    id: uid::new_uid('p'),
                    checked_at: None,
                    created_at: now,
                    updated_at: now,
                };

                photo::Entity::insert(photo_row.clone().into_active_model().reset_all())
                    .exec_without_returning(self.db)
                    .await?;

                let model = file::Model {
                    id: uid::new_uid('f'),
                    photo_uid: photo_row.id,
                    file_name: f.file_name.clone(),
                    file_hash: f.file_hash.clone(),
                    file_size: f.file_size,
                    created_at: now,
                    updated_at: now,
                };

                file::Entity::insert(model.clone().into_active_model().reset_all())
                    .exec_without_returning(self.db)
                    .await?;

                (model, IndexStatus::Added)
            }
        };

        let mut marker_uids = Vec::new();

        if f.is_jpeg() {
            match self.detector.detect(f) {
                Ok(detections) => {
                    for detection in detections {
                        let m = Marker::new_face(&detection, &model, "");
                        let m = markers::update_or_create(self.db, m).await?;

                        marker_uids.push(m.uid().to_string());
                    }
                }
                Err(err) => {
                    warn!("index: face detection failed for {} ({err})", f.file_name);
                }
            }
        }

        Ok(IndexResult {
            status,
            file_uid: model.id,
            marker_uids,
            err: None,
        })
    }
}
