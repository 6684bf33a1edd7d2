//! API version resolution from the `/api/{version}/...` path segment.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::app::errors::json_error_with;
use crate::app::services::AppServices;
use crate::context::ApiVersion;

/// `v<digits>` segment after `/api`, if any.
pub fn version_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_start_matches('/').split('/');
    if segments.next() != Some("api") {
        return None;
    }
    segments.next().filter(|seg| {
        seg.strip_prefix('v')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    })
}

pub async fn api_versioning(State(services): State<Arc<AppServices>>, mut req: Request, next: Next) -> Response {
    let api = &services.config.api;
    let version = version_from_path(req.uri().path())
        .unwrap_or(api.default_version.as_str())
        .to_string();

    if !api.supported_versions.iter().any(|v| *v == version) {
        return json_error_with(
            StatusCode::BAD_REQUEST,
            "Unsupported API version",
            format!(
                "API version '{version}' is not supported. Supported versions: {}",
                api.supported_versions.join(", ")
            ),
            json!({ "supported_versions": api.supported_versions }),
        );
    }

    req.extensions_mut().insert(ApiVersion(version.clone()));
    let mut response = next.run(req).await;
    if let Ok(v) = HeaderValue::from_str(&version) {
        response.headers_mut().insert("x-api-version", v);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_segment_detection() {
        assert_eq!(version_from_path("/api/v1/users"), Some("v1"));
        assert_eq!(version_from_path("/api/v12"), Some("v12"));
        assert_eq!(version_from_path("/api/health"), None);
        assert_eq!(version_from_path("/api/version/x"), None);
        assert_eq!(version_from_path("/api/v"), None);
        assert_eq!(version_from_path("/v1/users"), None);
    }
}
