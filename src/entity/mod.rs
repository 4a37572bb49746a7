//! SeaORM entity definitions for PostgreSQL database.

pub mod image;
pub mod image_metadata;
