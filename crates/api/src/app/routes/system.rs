use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::{IntoResponse, Response}};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use crate::app::services::AppServices;

/// GET /api/health
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": services.config.server.version,
        "environment": services.config.server.environment,
    }))
}

/// Anything no route matched.
pub async fn not_found(Extension(services): Extension<Arc<AppServices>>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "message": "The requested API endpoint does not exist.",
            "available_versions": services.config.api.supported_versions,
        })),
    )
        .into_response()
}
