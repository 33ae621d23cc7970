//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel};

use facegraph_core::domain::crop::Area;
use facegraph_core::domain::detection::FaceDetection;
use facegraph_core::domain::embedding::{Embedding, Embeddings};
use facegraph_core::infrastructure::database::entities::{file, marker, photo};
use facegraph_core::infrastructure::database::Database;

/// Fresh in-memory database with all migrations applied.
pub async fn test_db() -> Database {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let db = Database::in_memory().await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

/// Inserts a photo with one file and returns the file row. The photo
/// starts out checked, so tests can observe invalidation.
pub async fn seed_file(db: &DatabaseConnection, name: &str) -> file::Model {
    let now = Utc::now();

    let photo_row = photo::Model {
        id: format!("p{}", stable_hex(name)),
        checked_at: Some(now),
        created_at: now,
        updated_at: now,
    };

    photo::Entity::insert(photo_row.clone().into_active_model().reset_all())
        .exec_without_returning(db)
        .await
        .expect("insert photo");

    let file_row = file::Model {
        id: format!("f{}", stable_hex(name)),
        photo_uid: photo_row.id,
        file_name: name.to_string(),
        file_hash: stable_hex(name),
        file_size: 1024,
        created_at: now,
        updated_at: now,
    };

    file::Entity::insert(file_row.clone().into_active_model().reset_all())
        .exec_without_returning(db)
        .await
        .expect("insert file");

    file_row
}

/// Deterministic 32-char hex string derived from a name, so fixture ids
/// are stable across runs.
pub fn stable_hex(name: &str) -> String {
    let mut out = String::with_capacity(32);

    for (i, b) in name.bytes().cycle().take(16).enumerate() {
        out.push_str(&format!("{:02x}", b.wrapping_add(i as u8)));
    }

    out
}

/// A detection at the given position carrying one embedding vector.
pub fn detection_at(x: f32, y: f32, embedding: Vec<f64>) -> FaceDetection {
    FaceDetection {
        area: Area::new(x, y, 0.2, 0.2),
        size: 300,
        score: 100,
        embeddings: Embeddings(vec![Embedding(embedding)]),
        landmarks_json: String::new(),
    }
}

pub async fn reload_marker(db: &DatabaseConnection, id: &str) -> marker::Model {
    marker::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query marker")
        .expect("marker exists")
}
