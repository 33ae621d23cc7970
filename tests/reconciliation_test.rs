//! End-to-end reconciliation tests: markers, face clusters and subjects
//! against a real (in-memory) database.

mod helpers;

use facegraph_core::config::FaceConfig;
use facegraph_core::domain::crop::Area;
use facegraph_core::domain::embedding::{Embedding, Embeddings, DIST_UNKNOWN};
use facegraph_core::domain::provenance::{MarkerKind, Src, SubjectKind};
use facegraph_core::infrastructure::database::entities::{face, marker, photo, subject};
use facegraph_core::operations::{faces, markers, subjects};
use facegraph_core::operations::markers::{Marker, MarkerForm};

use helpers::{detection_at, reload_marker, seed_file, test_db};
use sea_orm::{EntityTrait, PaginatorTrait};

fn cfg() -> FaceConfig {
    FaceConfig::default()
}

fn single(embedding: Vec<f64>) -> Embeddings {
    Embeddings(vec![Embedding(embedding)])
}

#[tokio::test]
async fn rejects_invalid_marker_positions() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "invalid.jpg").await;

    let mut zero = Marker::new(&file, Area::default(), "", Src::Image, MarkerKind::Face);
    assert!(zero.create(db.conn()).await.is_err());

    let mut out_of_bounds = Marker::new(&file, Area::default(), "", Src::Image, MarkerKind::Face);
    out_of_bounds.model.x = 1.5;
    out_of_bounds.model.y = 0.5;
    assert!(out_of_bounds.save(db.conn()).await.is_err());

    let count = marker::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn set_face_requires_a_face_marker() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "label.jpg").await;

    let f = faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap();

    let mut label = Marker::new(
        &file,
        Area::new(0.4, 0.4, 0.1, 0.1),
        "",
        Src::Image,
        MarkerKind::Label,
    );
    label.create(db.conn()).await.unwrap();

    assert!(label.set_face(db.conn(), &cfg(), None, -1.0).await.is_err());
    assert!(label
        .set_face(db.conn(), &cfg(), Some(&f), -1.0)
        .await
        .is_err());
}

#[tokio::test]
async fn set_face_links_marker_and_recomputes_distance() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "link.jpg").await;

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.create(db.conn()).await.unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let updated = m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap();
    assert!(updated);

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.face_id, f.id);
    assert!((row.face_dist - 0.1).abs() < 1e-9);
    assert!(!row.marker_review);
    assert!(row.matched_at.is_some());

    // The containing photo is flagged for metadata maintenance.
    let photo_row = photo::Entity::find_by_id(file.photo_uid.clone())
        .one(db.conn())
        .await
        .unwrap()
        .unwrap();
    assert!(photo_row.checked_at.is_none());

    // Linking the same face again only bumps the match timestamp.
    let again = m.set_face(db.conn(), &cfg(), Some(&f), 0.1).await.unwrap();
    assert!(!again);
}

#[tokio::test]
async fn set_face_records_collision_and_keeps_manual_subject() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "collision.jpg").await;

    let subj_a = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();
    let subj_b = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("John Smith", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face(&subj_b.id, Src::Manual, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.model.subj_uid = subj_a.id.clone();
    m.model.subj_src = Src::Manual.to_string();
    m.create(db.conn()).await.unwrap();

    let updated = m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap();
    assert!(!updated);

    // The marker keeps its manual subject and stays unlinked.
    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.subj_uid, subj_a.id);
    assert_eq!(row.face_id, "");

    // The face recorded the collision and will be re-evaluated.
    let face_row = face::Entity::find_by_id(f.id.clone())
        .one(db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(face_row.collisions, 1);
    assert!(face_row.collision_radius >= faces::COLLISION_RADIUS_FLOOR);
    assert!(face_row.matched_at.is_none());
    assert_eq!(face_row.subj_uid, subj_b.id);
}

#[tokio::test]
async fn clear_face_resets_automatically_assigned_subject() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "clear.jpg").await;

    let subj = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face(&subj.id, Src::Manual, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.create(db.conn()).await.unwrap();

    assert!(m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap());

    // The marker adopted the face's subject automatically.
    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.subj_uid, subj.id);

    assert!(m.clear_face(db.conn()).await.unwrap());

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.face_id, "");
    assert_eq!(row.face_dist, DIST_UNKNOWN);
    assert_eq!(row.subj_uid, "");

    // Clearing again is a no-op.
    assert!(!m.clear_face(db.conn()).await.unwrap());
}

#[tokio::test]
async fn clear_face_keeps_manual_subject() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "keep.jpg").await;

    let subj = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.model.subj_uid = subj.id.clone();
    m.model.subj_src = Src::Manual.to_string();
    m.create(db.conn()).await.unwrap();

    assert!(m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap());
    assert!(m.clear_face(db.conn()).await.unwrap());

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.face_id, "");
    assert_eq!(row.subj_uid, subj.id);
}

#[tokio::test]
async fn clear_subject_resets_links_and_records_collision() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "clearsubj.jpg").await;

    let subj = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face(&subj.id, Src::Manual, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.model.marker_name = "Jane Doe".to_string();
    m.create(db.conn()).await.unwrap();

    assert!(m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap());

    m.clear_subject(db.conn(), Src::Manual).await.unwrap();

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.marker_name, "");
    assert_eq!(row.face_id, "");
    assert_eq!(row.face_dist, DIST_UNKNOWN);
    assert_eq!(row.subj_uid, "");
    assert_eq!(row.subj_src, "manual");

    let face_row = face::Entity::find_by_id(f.id.clone())
        .one(db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(face_row.collisions, 1);
}

#[tokio::test]
async fn naming_a_marker_cascades_to_automatic_siblings() {
    let db = test_db().await;
    let file_a = seed_file(db.conn(), "a.jpg").await;
    let file_b = seed_file(db.conn(), "b.jpg").await;
    let file_c = seed_file(db.conn(), "c.jpg").await;

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut named = Marker::new_face(&detection_at(0.3, 0.3, vec![0.05, 0.0, 0.0]), &file_a, "");
    named.create(db.conn()).await.unwrap();
    assert!(named
        .set_face(db.conn(), &cfg(), Some(&f), -1.0)
        .await
        .unwrap());

    let mut sibling = Marker::new_face(&detection_at(0.3, 0.3, vec![0.08, 0.0, 0.0]), &file_b, "");
    sibling.create(db.conn()).await.unwrap();
    assert!(sibling
        .set_face(db.conn(), &cfg(), Some(&f), -1.0)
        .await
        .unwrap());

    // A sibling whose subject was set manually must not be overwritten.
    let other_subj = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("John Smith", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let mut manual = Marker::new_face(&detection_at(0.3, 0.3, vec![0.06, 0.0, 0.0]), &file_c, "");
    manual.model.face_id = f.id.clone();
    manual.model.subj_uid = other_subj.id.clone();
    manual.model.subj_src = Src::Manual.to_string();
    manual.create(db.conn()).await.unwrap();

    let form = MarkerForm {
        subj_src: Src::Manual,
        marker_name: "Jane Doe".to_string(),
        marker_invalid: false,
        marker_review: false,
    };

    assert!(named
        .save_form(db.conn(), &cfg(), &form)
        .await
        .unwrap());

    let subj = subjects::find_by_slug(db.conn(), "jane-doe")
        .await
        .unwrap()
        .expect("subject created");

    let named_row = reload_marker(db.conn(), named.uid()).await;
    assert_eq!(named_row.subj_uid, subj.id);
    assert_eq!(named_row.subj_src, "manual");
    assert_eq!(named_row.marker_name, "Jane Doe");

    // The face was claimed for the new subject.
    let face_row = face::Entity::find_by_id(f.id.clone())
        .one(db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(face_row.subj_uid, subj.id);

    // The automatic sibling follows, flagged as automatic.
    let sibling_row = reload_marker(db.conn(), sibling.uid()).await;
    assert_eq!(sibling_row.subj_uid, subj.id);
    assert_eq!(sibling_row.subj_src, "auto");
    assert!(!sibling_row.marker_review);

    // The manual sibling stays untouched.
    let manual_row = reload_marker(db.conn(), manual.uid()).await;
    assert_eq!(manual_row.subj_uid, other_subj.id);
    assert_eq!(manual_row.subj_src, "manual");
}

#[tokio::test]
async fn renaming_a_marker_renames_the_subject() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "rename.jpg").await;

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.05, 0.0, 0.0]), &file, "");
    m.create(db.conn()).await.unwrap();
    assert!(m.set_face(db.conn(), &cfg(), Some(&f), -1.0).await.unwrap());

    let name = |n: &str| MarkerForm {
        subj_src: Src::Manual,
        marker_name: n.to_string(),
        marker_invalid: false,
        marker_review: false,
    };

    assert!(m
        .save_form(db.conn(), &cfg(), &name("Jane Doe"))
        .await
        .unwrap());

    let subj = subjects::find_by_slug(db.conn(), "jane-doe")
        .await
        .unwrap()
        .unwrap();

    // Renaming keeps the subject row, changing name and slug.
    let mut m = markers::find_marker(db.conn(), m.uid()).await.unwrap().unwrap();
    assert!(m
        .save_form(db.conn(), &cfg(), &name("Franzilein"))
        .await
        .unwrap());

    let renamed = subjects::find_subject(db.conn(), &subj.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.subj_name, "Franzilein");
    assert_eq!(renamed.subj_slug, "franzilein");
    assert!(subjects::find_by_slug(db.conn(), "jane-doe")
        .await
        .unwrap()
        .is_none());

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.marker_name, "Franzilein");
    assert_eq!(row.subj_uid, subj.id);
}

#[tokio::test]
async fn renaming_onto_an_existing_subject_merges() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "merge.jpg").await;

    let subj_a = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();
    let subj_b = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Bob", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.05, 0.0, 0.0]), &file, "");
    m.model.subj_uid = subj_b.id.clone();
    m.model.subj_src = Src::Manual.to_string();
    m.model.marker_name = "Bob".to_string();
    m.create(db.conn()).await.unwrap();

    let target = subjects::update_name(db.conn(), subj_b.clone(), "Jane Doe")
        .await
        .unwrap();
    assert_eq!(target.id, subj_a.id);

    // The old subject is gone and its markers point at the merge target.
    assert!(subjects::find_subject(db.conn(), &subj_b.id)
        .await
        .unwrap()
        .is_none());

    let row = reload_marker(db.conn(), m.uid()).await;
    assert_eq!(row.subj_uid, subj_a.id);

    let count = subject::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn update_or_create_merges_nearby_detections() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "prox.jpg").await;

    let first = markers::update_or_create(
        db.conn(),
        Marker::new_face(&detection_at(0.30, 0.30, vec![0.1, 0.0, 0.0]), &file, ""),
    )
    .await
    .unwrap();

    // A re-detection of roughly the same region updates in place.
    let mut redetected = detection_at(0.33, 0.33, vec![0.2, 0.0, 0.0]);
    redetected.score = 80;

    let merged = markers::update_or_create(
        db.conn(),
        Marker::new_face(&redetected, &file, ""),
    )
    .await
    .unwrap();

    assert_eq!(merged.uid(), first.uid());
    assert_eq!(merged.model.score, 80);

    let count = marker::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 1);

    // A distinct region becomes its own marker.
    let separate = markers::update_or_create(
        db.conn(),
        Marker::new_face(&detection_at(0.60, 0.60, vec![0.3, 0.0, 0.0]), &file, ""),
    )
    .await
    .unwrap();
    assert_ne!(separate.uid(), first.uid());

    let count = marker::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn update_or_create_respects_provenance_priority() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "prio.jpg").await;

    let mut manual = markers::update_or_create(
        db.conn(),
        Marker::new_face(&detection_at(0.30, 0.30, vec![0.1, 0.0, 0.0]), &file, ""),
    )
    .await
    .unwrap();

    manual.model.marker_src = Src::Manual.to_string();
    manual.save(db.conn()).await.unwrap();

    // A lower-priority re-detection of the same region is ignored.
    let mut redetected = detection_at(0.32, 0.32, vec![0.9, 0.0, 0.0]);
    redetected.score = 5;

    let kept = markers::update_or_create(
        db.conn(),
        Marker::new_face(&redetected, &file, ""),
    )
    .await
    .unwrap();

    assert_eq!(kept.uid(), manual.uid());
    assert_eq!(kept.model.score, 100);
    assert_eq!(kept.model.marker_src, "manual");

    let row = reload_marker(db.conn(), manual.uid()).await;
    assert_eq!(row.score, 100);
}

#[tokio::test]
async fn match_markers_links_faceless_markers_within_distance() {
    let db = test_db().await;
    let file_a = seed_file(db.conn(), "near.jpg").await;
    let file_b = seed_file(db.conn(), "far.jpg").await;

    let mut near = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file_a, "");
    near.create(db.conn()).await.unwrap();

    let mut far = Marker::new_face(&detection_at(0.3, 0.3, vec![1.0, 0.0, 0.0]), &file_b, "");
    far.create(db.conn()).await.unwrap();

    let f = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &single(vec![0.0, 0.0, 0.0])).unwrap(),
    )
    .await
    .unwrap();

    let matched = faces::match_markers(db.conn(), &cfg(), &f).await.unwrap();
    assert_eq!(matched, 1);

    let near_row = reload_marker(db.conn(), near.uid()).await;
    assert_eq!(near_row.face_id, f.id);

    let far_row = reload_marker(db.conn(), far.uid()).await;
    assert_eq!(far_row.face_id, "");
}

#[tokio::test]
async fn face_accessor_skips_low_quality_markers() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "quality.jpg").await;

    let subj = subjects::first_or_create(
        db.conn(),
        subjects::new_subject("Jane Doe", SubjectKind::Person, Src::Manual).unwrap(),
    )
    .await
    .unwrap();

    let mut small = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    small.model.subj_uid = subj.id.clone();
    small.model.subj_src = Src::Manual.to_string();
    small.model.size = 40;
    small.create(db.conn()).await.unwrap();

    assert!(small.face(db.conn(), &cfg()).await.unwrap().is_none());

    let mut good = Marker::new_face(&detection_at(0.6, 0.6, vec![0.1, 0.0, 0.0]), &file, "");
    good.model.subj_uid = subj.id.clone();
    good.model.subj_src = Src::Manual.to_string();
    good.create(db.conn()).await.unwrap();

    let f = good.face(db.conn(), &cfg()).await.unwrap().expect("face created");
    assert_eq!(f.subj_uid, subj.id);
    assert_eq!(good.model.face_id, f.id);

    let count = face::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn subject_accessor_creates_named_subjects_once() {
    let db = test_db().await;
    let file = seed_file(db.conn(), "named.jpg").await;

    let mut m = Marker::new_face(&detection_at(0.3, 0.3, vec![0.1, 0.0, 0.0]), &file, "");
    m.model.subj_src = Src::Manual.to_string();
    m.model.marker_name = "carol lane".to_string();
    m.create(db.conn()).await.unwrap();

    let subj = m.subject(db.conn()).await.unwrap().expect("subject created");
    assert_eq!(subj.subj_name, "Carol Lane");
    assert_eq!(subj.subj_slug, "carol-lane");
    assert_eq!(m.model.subj_uid, subj.id);

    // Repeated access resolves to the same subject.
    let again = m.subject(db.conn()).await.unwrap().unwrap();
    assert_eq!(again.id, subj.id);

    let count = subject::Entity::find().count(db.conn()).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn face_ids_are_stable_and_claims_are_atomic() {
    let db = test_db().await;

    let samples = Embeddings(vec![
        Embedding(vec![0.0, 0.0, 0.0]),
        Embedding(vec![0.2, 0.0, 0.0]),
    ]);

    let f1 = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &samples).unwrap(),
    )
    .await
    .unwrap();
    let f2 = faces::first_or_create(
        db.conn(),
        faces::new_face("", Src::Auto, &samples).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(f1.id, f2.id);
    assert_eq!(face::Entity::find().count(db.conn()).await.unwrap(), 1);

    // Only the first claim wins; later claims never overwrite.
    assert!(faces::claim_subject(db.conn(), &f1.id, "jaaa").await.unwrap());
    assert!(!faces::claim_subject(db.conn(), &f1.id, "jbbb").await.unwrap());

    let row = face::Entity::find_by_id(f1.id.clone())
        .one(db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.subj_uid, "jaaa");
}
