//! Route handlers, grouped by resource.

pub mod api_keys;
pub mod auth;
pub mod issues;
pub mod me;
pub mod notifications;
pub mod teams;
pub mod workspaces;
