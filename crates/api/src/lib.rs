//! HTTP API: configuration, middleware pipeline, routing and handlers.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

pub use app::{build_app, router};
pub use config::AppConfig;
