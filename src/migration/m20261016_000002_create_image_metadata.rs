//! Migration: Create image_metadata table.
//!
//! One row per image, cascading on image delete.

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
                CREATE TABLE image_metadata (
                    image_id UUID PRIMARY KEY REFERENCES images(id) ON DELETE CASCADE,
                    owner_id VARCHAR(255) NOT NULL,

                    -- Annotation tracking
                    status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
                    description TEXT NOT NULL DEFAULT '',
                    tags TEXT[] NOT NULL DEFAULT '{}',
                    colors TEXT[] NOT NULL DEFAULT '{}',

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_image_metadata_owner ON image_metadata(owner_id);

                -- Containment / overlap searches
                CREATE INDEX idx_image_metadata_tags ON image_metadata USING GIN (tags);
                CREATE INDEX idx_image_metadata_colors ON image_metadata USING GIN (colors);

                -- Stale annotation sweep
                CREATE INDEX idx_image_metadata_in_flight ON image_metadata(updated_at)
                    WHERE status IN ('pending', 'processing');
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS image_metadata CASCADE;")
            .await?;

        Ok(())
    }
}
