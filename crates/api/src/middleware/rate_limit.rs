//! Fixed-window request throttling per route group.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use serde_json::json;

use pktracker_infra::limiter_key;

use crate::app::errors::json_error_with;
use crate::app::services::AppServices;
use crate::context::{AuthContext, ClientIp};

/// Middleware state: which configured limit applies to the routes it wraps.
#[derive(Clone)]
pub struct RouteLimit {
    pub services: Arc<AppServices>,
    pub kind: &'static str,
}

impl RouteLimit {
    pub fn new(services: Arc<AppServices>, kind: &'static str) -> Self {
        Self { services, kind }
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, v);
    }
}

pub async fn rate_limit(State(route): State<RouteLimit>, req: Request, next: Next) -> Response {
    let limit = route.services.config.rate_limits.for_kind(route.kind);
    let limiter = &route.services.limiter;

    let user_id = req.extensions().get::<AuthContext>().map(AuthContext::user_id);
    let ip = req
        .extensions()
        .get::<ClientIp>()
        .map(|ip| ip.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = limiter_key(route.kind, user_id, &ip);

    if limiter.too_many_attempts(&key, limit.max_attempts) {
        let retry_after = limiter.available_in(&key);
        tracing::warn!(key = %key, retry_after, "rate limit exceeded");

        let mut response = json_error_with(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests",
            format!("Rate limit exceeded. Please try again in {retry_after} seconds."),
            json!({ "retry_after": retry_after }),
        );
        let headers = response.headers_mut();
        set_header(headers, "retry-after", retry_after);
        set_header(headers, "x-ratelimit-limit", limit.max_attempts);
        set_header(headers, "x-ratelimit-remaining", 0);
        return response;
    }

    limiter.hit(&key, Duration::seconds(limit.decay_seconds));
    let remaining = limiter.remaining(&key, limit.max_attempts);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    set_header(headers, "x-ratelimit-limit", limit.max_attempts);
    set_header(headers, "x-ratelimit-remaining", remaining);
    response
}
