//! Migration: Create images table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE images (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    owner_id VARCHAR(255) NOT NULL,           -- identity from the auth provider

                    -- File info
                    filename VARCHAR(500) NOT NULL,           -- name as uploaded
                    content_type VARCHAR(100) NOT NULL,
                    size_bytes BIGINT NOT NULL DEFAULT 0,
                    content_hash CHAR(64) NOT NULL,           -- SHA-256 hex of the original

                    -- Artifacts
                    original_key VARCHAR(1000) NOT NULL,
                    original_url VARCHAR(2000) NOT NULL,
                    thumbnail_key VARCHAR(1000) NOT NULL,
                    thumbnail_url VARCHAR(2000) NOT NULL,

                    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- Gallery listing: owner's images newest first
                CREATE INDEX idx_images_owner_uploaded_at ON images(owner_id, uploaded_at DESC);

                -- Lookups by content hash
                CREATE INDEX idx_images_owner_content_hash ON images(owner_id, content_hash);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS images CASCADE;")
            .await?;

        Ok(())
    }
}
