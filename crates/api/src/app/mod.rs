//! HTTP API application wiring (axum router + service wiring).
//!
//! - `services.rs`: stores, dispatcher, token codec, limiter and audit trail
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies and the user resource
//! - `validation.rs`: field rules shared by handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware::{self, RouteLimit};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;
pub mod validation;

use services::{AppServices, StartupError};

/// Build services for `config` and the router serving them.
pub fn build_app(config: AppConfig) -> Result<(Router, Arc<AppServices>), StartupError> {
    let services = Arc::new(AppServices::build(config)?);
    Ok((router(services.clone()), services))
}

/// The full HTTP router over already built services.
pub fn router(services: Arc<AppServices>) -> Router {
    // Public routes: throttled per IP under the `auth` limit.
    let public = routes::public_router().route_layer(from_fn_with_state(
        RouteLimit::new(services.clone(), "auth"),
        middleware::rate_limit,
    ));

    // Protected routes: authenticate first so the `api` limit is keyed per user.
    let protected = routes::protected_router()
        .route_layer(from_fn_with_state(
            RouteLimit::new(services.clone(), "api"),
            middleware::rate_limit,
        ))
        .route_layer(from_fn_with_state(services.clone(), middleware::auth_middleware));

    Router::new()
        .route("/api/health", get(routes::system::health))
        .nest("/api/v1", public.merge(protected))
        .fallback(routes::system::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(services.clone(), middleware::request_logging))
                .layer(from_fn_with_state(services.clone(), middleware::security_headers))
                .layer(from_fn_with_state(services.clone(), middleware::api_versioning))
                .layer(Extension(services)),
        )
}
