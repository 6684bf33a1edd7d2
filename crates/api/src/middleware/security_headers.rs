//! Security response headers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::app::services::AppServices;
use crate::config::SecurityHeadersConfig;

const CSP_DIRECTIVES: [&str; 12] = [
    "default-src 'self'",
    "script-src 'self' 'unsafe-inline' 'unsafe-eval'",
    "style-src 'self' 'unsafe-inline'",
    "img-src 'self' data: https:",
    "font-src 'self' data:",
    "connect-src 'self'",
    "media-src 'self'",
    "object-src 'none'",
    "child-src 'self'",
    "form-action 'self'",
    "base-uri 'self'",
    "manifest-src 'self'",
];

const PERMISSIONS_DIRECTIVES: [&str; 10] = [
    "camera=()",
    "microphone=()",
    "geolocation=()",
    "interest-cohort=()",
    "payment=()",
    "usb=()",
    "magnetometer=()",
    "gyroscope=()",
    "fullscreen=(self)",
    "sync-xhr=()",
];

pub fn content_security_policy() -> String {
    CSP_DIRECTIVES.join("; ")
}

pub fn permissions_policy() -> String {
    PERMISSIONS_DIRECTIVES.join(", ")
}

/// `Strict-Transport-Security` value for the configured settings.
pub fn hsts_value(config: &SecurityHeadersConfig) -> String {
    let mut value = format!("max-age={}", config.hsts.max_age);
    if config.hsts.include_subdomains {
        value.push_str("; includeSubDomains");
    }
    if config.hsts.preload {
        value.push_str("; preload");
    }
    value
}

/// Whether the client reached us over TLS, directly or through a proxy.
pub fn is_secure(req: &Request) -> bool {
    let forwarded_https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("https"));
    forwarded_https || req.uri().scheme_str() == Some("https")
}

/// Apply the header set to `headers`. `secure` gates HSTS.
pub fn apply(headers: &mut HeaderMap, config: &SecurityHeadersConfig, secure: bool) {
    if !config.enabled {
        return;
    }

    if config.csp_enabled {
        if let Ok(v) = HeaderValue::from_str(&content_security_policy()) {
            headers.insert("content-security-policy", v);
        }
    }

    if config.hsts.enabled && secure {
        if let Ok(v) = HeaderValue::from_str(&hsts_value(config)) {
            headers.insert("strict-transport-security", v);
        }
    }

    headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert("referrer-policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    if let Ok(v) = HeaderValue::from_str(&permissions_policy()) {
        headers.insert("permissions-policy", v);
    }

    headers.remove("server");
    headers.remove("x-powered-by");

    headers.insert("cross-origin-embedder-policy", HeaderValue::from_static("require-corp"));
    headers.insert("cross-origin-opener-policy", HeaderValue::from_static("same-origin"));
    headers.insert("cross-origin-resource-policy", HeaderValue::from_static("same-origin"));
}

pub async fn security_headers(State(services): State<Arc<AppServices>>, req: Request, next: Next) -> Response {
    let secure = is_secure(&req);
    let mut response = next.run(req).await;
    apply(response.headers_mut(), &services.config.security_headers, secure);
    response
}
