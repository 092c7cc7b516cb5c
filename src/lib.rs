//! Scoring API Library
//!
//! This library provides the core functionality for the scoring API:
//! declarative request validation, token authentication, method dispatch and
//! resilient access to the key-value store behind the business handlers.
//!
//! # Modules
//!
//! - `api`: API-layer components.
//! - `core`: Request validation and business logic.
//! - `integrations`: External store access.
//! - `auth`: Envelope token checks.
//! - `config`: Configuration management.
//! - `db`: PostgreSQL key-value backend.
//! - `errors`: Error handling types.
//! - `fields`: Field rules and validation errors.
//! - `handlers`: Method dispatch and HTTP handlers.
//! - `requests`: Envelope and method argument schemas.
//! - `schema`: Ordered schemas and request models.
//! - `scoring`: Interest lookup and scoring.
//! - `store`: Retry and degraded-read policies over the store.

pub mod api;
pub mod core;
pub mod integrations;

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod fields;
pub mod handlers;
pub mod requests;
pub mod schema;
pub mod scoring;
pub mod store;
