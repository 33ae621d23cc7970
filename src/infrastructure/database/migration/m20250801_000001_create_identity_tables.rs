//! Initial migration to create the identity reconciliation tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create photos table
        manager
            .create_table(
                Table::create()
                    .table(Photos::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Photos::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Photos::CheckedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Photos::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Photos::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Create files table
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Files::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Files::PhotoUid).string().not_null().default(""))
                    .col(ColumnDef::new(Files::FileName).string().not_null().default(""))
                    .col(ColumnDef::new(Files::FileHash).string().not_null().default(""))
                    .col(ColumnDef::new(Files::FileSize).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Files::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Files::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Files::Table, Files::PhotoUid)
                            .to(Photos::Table, Photos::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Create subjects table
        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Subjects::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Subjects::SubjType).string().not_null().default(""))
                    .col(ColumnDef::new(Subjects::SubjSrc).string().not_null().default(""))
                    .col(ColumnDef::new(Subjects::SubjSlug).string().not_null().unique_key())
                    .col(ColumnDef::new(Subjects::SubjName).string().not_null().default(""))
                    .col(ColumnDef::new(Subjects::SubjFavorite).boolean().not_null().default(false))
                    .col(ColumnDef::new(Subjects::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Subjects::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Create faces table
        manager
            .create_table(
                Table::create()
                    .table(Faces::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Faces::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Faces::FaceSrc).string().not_null().default(""))
                    .col(ColumnDef::new(Faces::SubjUid).string().not_null().default(""))
                    .col(ColumnDef::new(Faces::Samples).integer().not_null().default(0))
                    .col(ColumnDef::new(Faces::SampleRadius).double().not_null().default(0.0))
                    .col(ColumnDef::new(Faces::Collisions).integer().not_null().default(0))
                    .col(ColumnDef::new(Faces::CollisionRadius).double().not_null().default(0.0))
                    .col(ColumnDef::new(Faces::EmbeddingJson).text().not_null().default(""))
                    .col(ColumnDef::new(Faces::MatchedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Faces::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Faces::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Create markers table
        manager
            .create_table(
                Table::create()
                    .table(Markers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Markers::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Markers::FileUid).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::FileHash).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::CropArea).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::MarkerType).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::MarkerSrc).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::MarkerName).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::MarkerInvalid).boolean().not_null().default(false))
                    .col(ColumnDef::new(Markers::MarkerReview).boolean().not_null().default(false))
                    .col(ColumnDef::new(Markers::SubjUid).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::SubjSrc).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::FaceId).string().not_null().default(""))
                    .col(ColumnDef::new(Markers::FaceDist).double().not_null().default(-1.0))
                    .col(ColumnDef::new(Markers::EmbeddingsJson).text().not_null().default(""))
                    .col(ColumnDef::new(Markers::LandmarksJson).text().not_null().default(""))
                    .col(ColumnDef::new(Markers::X).float().not_null().default(0.0))
                    .col(ColumnDef::new(Markers::Y).float().not_null().default(0.0))
                    .col(ColumnDef::new(Markers::W).float().not_null().default(0.0))
                    .col(ColumnDef::new(Markers::H).float().not_null().default(0.0))
                    .col(ColumnDef::new(Markers::Q).integer().not_null().default(0))
                    .col(ColumnDef::new(Markers::Size).integer().not_null().default(-1))
                    .col(ColumnDef::new(Markers::Score).integer().not_null().default(0))
                    .col(ColumnDef::new(Markers::MatchedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Markers::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Markers::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_markers_file_uid")
                    .table(Markers::Table)
                    .col(Markers::FileUid)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_markers_face_id")
                    .table(Markers::Table)
                    .col(Markers::FaceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_markers_subj_uid_src")
                    .table(Markers::Table)
                    .col(Markers::SubjUid)
                    .col(Markers::SubjSrc)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_files_photo_uid")
                    .table(Files::Table)
                    .col(Files::PhotoUid)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Markers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Faces::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Photos::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Photos {
    Table,
    Id,
    CheckedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
    PhotoUid,
    FileName,
    FileHash,
    FileSize,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Subjects {
    Table,
    Id,
    SubjType,
    SubjSrc,
    SubjSlug,
    SubjName,
    SubjFavorite,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Faces {
    Table,
    Id,
    FaceSrc,
    SubjUid,
    Samples,
    SampleRadius,
    Collisions,
    CollisionRadius,
    EmbeddingJson,
    MatchedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Markers {
    Table,
    Id,
    FileUid,
    FileHash,
    CropArea,
    MarkerType,
    MarkerSrc,
    MarkerName,
    MarkerInvalid,
    MarkerReview,
    SubjUid,
    SubjSrc,
    FaceId,
    FaceDist,
    EmbeddingsJson,
    LandmarksJson,
    X,
    Y,
    W,
    H,
    Q,
    Size,
    Score,
    MatchedAt,
    CreatedAt,
    UpdatedAt,
}
