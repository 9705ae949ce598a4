//! HTTP API.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use server::{AppState, router, start_server};
