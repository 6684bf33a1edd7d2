//! Request logging to the `api` target.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use crate::app::services::AppServices;
use crate::context::{AuthenticatedUser, ClientIp};
use crate::middleware::client_ip;

const REDACTED: &str = "[REDACTED]";

/// Mask query parameters whose name contains any of `sensitive` (case-insensitive).
pub fn mask_url(url: &str, sensitive: &[String]) -> String {
    let Some((path, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let masked: Vec<String> = query
        .split('&')
        .map(|pair| {
            let (name, _) = pair.split_once('=').unwrap_or((pair, ""));
            let lower = name.to_ascii_lowercase();
            if sensitive.iter().any(|s| lower.contains(s.as_str())) {
                format!("{name}={REDACTED}")
            } else {
                pair.to_string()
            }
        })
        .collect();

    format!("{path}?{}", masked.join("&"))
}

pub async fn request_logging(State(services): State<Arc<AppServices>>, mut req: Request, next: Next) -> Response {
    let started = Instant::now();

    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let ip = client_ip(req.headers(), peer, &services.config.auth.trusted_proxies);
    req.extensions_mut().insert(ClientIp(ip.clone()));

    let method = req.method().clone();
    let url = mask_url(&req.uri().to_string(), &services.config.logging.sensitive_fields);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut response = next.run(req).await;

    let elapsed_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
    let user = response.extensions().get::<AuthenticatedUser>().cloned();

    tracing::info!(
        target: "api",
        method = %method,
        url = %url,
        ip = %ip,
        user_agent = %user_agent,
        user_id = user.as_ref().map(|u| u.user_id.to_string()),
        user_email = user.as_ref().map(|u| u.email.as_str()),
        status_code = response.status().as_u16(),
        response_time_ms = elapsed_ms,
        "API Request"
    );

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        headers.insert("x-response-time", v);
    }
    if let Ok(v) = HeaderValue::from_str(&format!("req_{}", uuid::Uuid::new_v4().simple())) {
        headers.insert("x-request-id", v);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn sensitive_query_values_are_masked() {
        let fields = AppConfig::default().logging.sensitive_fields;
        assert_eq!(
            mask_url("/api/v1/users?search=ash&api_key=abc&Password=hunter2&page=2", &fields),
            "/api/v1/users?search=ash&api_key=[REDACTED]&Password=[REDACTED]&page=2"
        );
        assert_eq!(mask_url("/api/health", &fields), "/api/health");
        assert_eq!(mask_url("/x?token", &fields), "/x?token=[REDACTED]");
    }
}
