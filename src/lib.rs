//! AI Gallery Server library.
//!
//! Image ingestion, background vision-model annotation and gallery search,
//! exposed as an actix-web API.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
