//! Workbit: the backend of an issue and project tracker.
//!
//! A JSON HTTP API over workspaces, teams, projects, issues, status updates,
//! milestones and notifications. State lives in one [`model::Store`]
//! aggregate that is cached by [`store::StoreHandle`] and persisted through a
//! pluggable [`db::StoreBackend`] (JSON file, Postgres or libSQL).

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod service;
pub mod settings;
pub mod store;
pub mod web;

pub use config::Config;
pub use error::{ConfigError, DatabaseError, ServiceError};
