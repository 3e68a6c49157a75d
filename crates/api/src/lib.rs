//! HTTP surface of the housing price service

pub mod api;
pub mod assets;
pub mod config;

pub use api::{create_router, serve, AppState};
pub use config::ServiceConfig;
