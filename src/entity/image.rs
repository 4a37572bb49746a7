//! Image entity for SeaORM.
//!
//! One row per stored original; the thumbnail lives next to it.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "images")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: String,

    // File info
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content_hash: String,

    // Artifacts
    pub original_key: String,
    pub original_url: String,
    pub thumbnail_key: String,
    pub thumbnail_url: String,

    pub uploaded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::image_metadata::Entity")]
    Metadata,
}

impl Related<super::image_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Metadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
